//! Example consumer: a separate Rust project that uses graph-rest as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use graph_rest::{
    init_tracing, Api, AppState, Attribute, AttributeKind, EntityType, ResourceDescriptor, Settings,
};
use serde_json::json;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let _guard = init_tracing(&settings)?;

    let note = EntityType::builder("Note")
        .attribute(Attribute::new("note_id", AttributeKind::UniqueId))
        .attribute(Attribute::new("title", AttributeKind::String).required())
        .attribute(Attribute::new("body", AttributeKind::String))
        .attribute(Attribute::new("pinned", AttributeKind::Boolean).default_value(json!(false)))
        .build();
    let notes = ResourceDescriptor::builder("notes", note, "note_id").build()?;

    let addr = settings.listen_addr();
    let state = AppState::connect(settings).await?;
    let app = Api::new(state).resource(notes)?.into_router();

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
