//! Shared fixtures for integration tests: an in-process fabric and an
//! orchestrator wired to it.

#![allow(dead_code)]

use std::sync::Arc;

use loom::{
    BroadcastBus, Fabric, InMemoryErrorStore, InMemoryReferenceStore, LlmClient, MemorySaver,
    MessageQueue, Orchestrator, PolicyManager, SessionSaver, SharedMemory,
};

/// Fabric over a temp-dir queue and spill directory. Keep the TempDir alive
/// for the duration of the test.
pub fn test_fabric() -> (tempfile::TempDir, Arc<Fabric>) {
    let dir = tempfile::tempdir().unwrap();
    let fabric = Arc::new(Fabric::new(
        Arc::new(BroadcastBus::new()),
        Arc::new(MessageQueue::new(dir.path().join("queue.db")).unwrap()),
        Arc::new(SharedMemory::with_spill_dir(dir.path().join("spill"))),
        Arc::new(InMemoryReferenceStore::new()),
        Arc::new(PolicyManager::new()),
    ));
    (dir, fabric)
}

/// Orchestrator with error store and session saver configured.
pub fn test_orchestrator(
    llm: Arc<dyn LlmClient>,
) -> (tempfile::TempDir, Orchestrator, Arc<dyn SessionSaver>) {
    let (dir, fabric) = test_fabric();
    let saver: Arc<dyn SessionSaver> = Arc::new(MemorySaver::new());
    let orchestrator = Orchestrator::new(fabric, llm)
        .with_error_store(Arc::new(InMemoryErrorStore::new()))
        .with_session_saver(Arc::clone(&saver));
    (dir, orchestrator, saver)
}
