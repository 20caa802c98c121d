//! Route table

use actix_web::web;

use super::{branch, config, configfiles, health, item, lock, notification, release};

const NAMESPACE_PATH: &str = "/apps/{app_id}/clusters/{cluster_name}/namespaces/{namespace}";

/// Every Beacon route under `context_path` (empty for the root)
pub fn routes(context_path: &str) -> actix_web::Scope {
    web::scope(context_path)
        .route("/health", web::get().to(health::health))
        // Client endpoints
        .route(
            "/configs/{app_id}/{cluster_name}/{namespace}",
            web::get().to(config::get_config),
        )
        .route(
            "/configfiles/json/{app_id}/{cluster_name}/{namespace}",
            web::get().to(configfiles::get_configfiles_json),
        )
        .route(
            "/notifications/v2",
            web::get().to(notification::get_notifications),
        )
        // Admin endpoints
        .service(
            web::scope(NAMESPACE_PATH)
                .route("/lock", web::get().to(lock::get_namespace_lock))
                .route("/items", web::get().to(item::find_items))
                .route("/items", web::post().to(item::create_item))
                .route("/items/{item_id}", web::put().to(item::update_item))
                .route("/releases", web::post().to(release::publish))
                .route(
                    "/releases/latest",
                    web::get().to(release::find_latest_release),
                )
                .route("/branches", web::get().to(branch::find_branch))
                .route("/branches", web::post().to(branch::create_branch))
                .route(
                    "/branches/{branch_name}/rules",
                    web::get().to(branch::find_branch_rules),
                )
                .route(
                    "/branches/{branch_name}/rules",
                    web::put().to(branch::update_branch_rules),
                )
                .route(
                    "/branches/{branch_name}",
                    web::delete().to(branch::delete_branch),
                ),
        )
        .route("/items/{item_id}", web::delete().to(item::delete_item))
        .route(
            "/releases/{release_id}/rollback",
            web::put().to(release::rollback),
        )
}
