pub mod config;
pub mod error;
pub mod schema;
pub mod tenant;

pub use config::Config;
pub use error::*;
pub use schema::{FieldMode, FieldSpec, FieldType, SchemaDescriptor};
pub use tenant::TenantContext;
