//! Collection listing and deletion

use crate::error::Result;
use crate::pipeline::StepGuard;
use crate::store::VectorStore;
use tracing::info;

/// List all collection names
pub async fn cmd_list_collections(
    store: &dyn VectorStore,
    guard: &StepGuard,
) -> Result<Vec<String>> {
    guard
        .run("list collections", store.list_collections())
        .await
}

/// Delete a collection and every point in it
pub async fn cmd_delete_collection(
    store: &dyn VectorStore,
    name: &str,
    guard: &StepGuard,
) -> Result<()> {
    guard
        .run("delete collection", store.delete_collection(name))
        .await?;
    info!("Deleted collection {}", name);
    Ok(())
}

/// Print collections to console
pub fn print_collections(collections: &[String]) {
    if collections.is_empty() {
        println!("No collections found.");
        return;
    }

    println!("\n📚 Collections\n");
    for name in collections {
        println!("  {}", name);
    }
    println!("\nTotal: {} collections", collections.len());
}
