pub mod books;

use std::sync::Arc;

use libris_db::Database;
use libris_genai::TextGenerator;
use libris_kernel::ModuleRegistry;

/// Register all project modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, db: &Database, generator: Arc<dyn TextGenerator>) {
    registry.register(books::create_module(db.clone(), generator));
}
