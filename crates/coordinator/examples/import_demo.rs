//! Example importing records together with their source file
//!
//! Runs three imports against a filesystem object store and a fjall record
//! store in a temporary directory: one that commits, one rejected for
//! duplicate coordinates, and one whose blob commit fails and is rolled back.
//!
//! Run with: cargo run --example import_demo

use std::sync::Arc;
use tandem_blob::{Fault, FsObjectStore, MemoryObjectStore, ObjectStore, ObjectStoreConfig};
use tandem_common::{Coordinates, Record};
use tandem_coordinator::{
    CoordinatorConfig, ImportFile, ImportHistory, ImportWorkflow, TransactionRegistry,
    TwoPhaseCoordinator,
};
use tandem_records::{FjallRecordStore, RecordStoreConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    println!("=== Import Transaction Example ===\n");

    let dir = tempfile::tempdir()?;
    let objects = Arc::new(
        FsObjectStore::open(&ObjectStoreConfig {
            root: dir.path().join("objects"),
            bucket: "import-files".to_string(),
        })
        .await?,
    );
    let records = FjallRecordStore::open(&RecordStoreConfig::new(dir.path().join("records")))?;
    let history = Arc::new(ImportHistory::new());

    let coordinator = Arc::new(TwoPhaseCoordinator::with_config(
        objects.clone(),
        Arc::new(records.clone()),
        Arc::new(TransactionRegistry::new()),
        CoordinatorConfig::from_env(),
    ));
    let workflow = ImportWorkflow::new(coordinator, history.clone(), "demo");

    // 1. A clean import commits both the file and the records
    let batch = vec![
        Record::new("Alice", Some(Coordinates::new(1, 1.5))),
        Record::new("Bob", Some(Coordinates::new(2, 2.5))),
        Record::new("Carol", None),
    ];
    let receipt = workflow
        .run(ImportFile::from_records(&batch)?, batch)
        .await?;
    println!(
        "✓ Imported {} records, file stored as {}",
        receipt.result.imported_count, receipt.final_object_key
    );
    println!("  visible: {}", objects.exists(&receipt.final_object_key).await?);

    // 2. Re-importing taken coordinates is rejected and leaves nothing behind
    let batch = vec![Record::new("Mallory", Some(Coordinates::new(1, 1.5)))];
    match workflow.run(ImportFile::from_records(&batch)?, batch).await {
        Ok(_) => println!("✗ Duplicate import unexpectedly succeeded"),
        Err(e) => println!("✓ Duplicate import rejected: {}", e),
    }

    // 3. A blob commit failure rolls the staged records back
    let failing = Arc::new(MemoryObjectStore::new());
    failing.inject(Fault::Commit);
    let failing_workflow = ImportWorkflow::new(
        Arc::new(TwoPhaseCoordinator::new(
            failing.clone(),
            Arc::new(records.clone()),
            Arc::new(TransactionRegistry::new()),
        )),
        history.clone(),
        "demo",
    );
    let batch = vec![Record::new("Dave", Some(Coordinates::new(3, 3.5)))];
    match failing_workflow
        .run(ImportFile::from_records(&batch)?, batch)
        .await
    {
        Ok(_) => println!("✗ Import unexpectedly committed"),
        Err(e) => println!("✓ Import aborted: {}", e),
    }
    println!("  blobs left behind: {}", failing.keys().len());

    println!("\nRecords stored: {}", records.len()?);
    println!("Import history:");
    for entry in history.entries() {
        println!(
            "  #{} {:?} added={} total={} failed={} {}",
            entry.id,
            entry.status,
            entry.added_count,
            entry.total_processed,
            entry.failed_count,
            entry.error_message.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
