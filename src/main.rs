// Feedhub server - social feed API with scheduled publication worker

use tokio::net::TcpListener;

use feedhub::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let address = config.server_address();

    // Initialize application state
    let app_state = AppState::new(config).await?;

    // Start the scheduled-post worker; it runs independently of request
    // handling
    app_state.publisher.clone().start();

    let app = create_router(app_state);

    println!("🚀 Feedhub server starting on http://{}", address);
    println!("📋 API overview:");
    println!("  POST   /api/v1/profiles                  - Create profile");
    println!("  GET    /api/v1/profiles?username=        - List profiles");
    println!("  POST   /api/v1/profiles/{{id}}/follow      - Follow profile");
    println!("  GET    /api/v1/posts?author=&title=      - Visibility-scoped feed");
    println!("  POST   /api/v1/posts                     - Create or schedule post");
    println!("  POST   /api/v1/posts/{{id}}/like           - Toggle like");
    println!("  POST   /api/v1/posts/{{id}}/comment        - Comment on post");

    let listener = TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
