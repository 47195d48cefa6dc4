use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "trendcache API",
        version = "0.1.0",
        description = "Trending searches per category, served from a periodically refreshed snapshot.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8888", description = "Local development")
    ),
    paths(
        crate::handlers::root::root,
        crate::handlers::health::health,
        crate::handlers::trends::get_trends,
        crate::handlers::update::trigger_update,
    ),
    tags(
        (name = "trends", description = "Trend snapshots and refresh control"),
        (name = "health", description = "Service status")
    )
)]
pub struct ApiDoc;
