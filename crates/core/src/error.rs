use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("tenant lists differ in length: {ids} project ids, {tags} tags")]
    TenantArity { ids: usize, tags: usize },

    #[error("invalid tenant entry '{0}'")]
    InvalidTenant(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}
