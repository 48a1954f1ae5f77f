//! Basic docfork Example
//!
//! Two writers edit the same document from the same revision. The second
//! save collides with the first and is settled by a resolver.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use docfork_core::{Conflict, Database, DocumentId, MergeResolver, MutableDocument};
use docfork_storage::MemoryStore;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("docfork Basic Example\n");

    let db = Database::new(MemoryStore::new());
    let id = DocumentId::new("user:scott")?;

    // Create a document
    let mut doc = MutableDocument::new(id.clone());
    doc.set("type", "profile").set("name", "Scott");
    let root = db.save(&doc)?;
    println!("Created {} at generation {}", root.id(), root.generation());

    // Writer A changes the type and adds a field
    let mut a = root.edit();
    a.set("type", "bio").set("gender", "male");
    let saved = db.save(&a)?;
    println!("Writer A saved generation {}", saved.generation());

    // Writer B still holds the root revision
    let mut b = root.edit();
    b.set("type", "bio").set("age", 31);

    println!("\n=== Default policy ===");
    let resolved = db.save_with_resolver(&b, None)?;
    println!("Winner body: {:?}", resolved.body());

    println!("\n=== Three-way merge ===");
    let db = Database::new(MemoryStore::new());
    db.set_resolver(Arc::new(MergeResolver));
    let root = db.save(&doc)?;
    let mut a = root.edit();
    a.set("type", "bio").set("gender", "male");
    db.save(&a)?;
    let mut b = root.edit();
    b.set("type", "bio").set("age", 31);
    let merged = db.save(&b)?;
    println!("Merged body: {:?}", merged.body());
    println!("History:");
    for rev in db.history(&id)? {
        println!("  - {}", rev);
    }

    println!("\n=== Custom resolver ===");
    db.set_resolver(Arc::new(|conflict: &Conflict| {
        println!(
            "  resolving {} (source gen {}, target gen {})",
            conflict.doc_id(),
            conflict.source().generation(),
            conflict.target().generation()
        );
        Some(conflict.target().clone())
    }));
    let mut stale = root.edit();
    stale.set("name", "Scott Pilgrim");
    let kept = db.save(&stale)?;
    println!("Kept body: {:?}", kept.body());

    Ok(())
}
