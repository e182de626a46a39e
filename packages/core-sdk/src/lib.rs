pub mod canned;
pub mod config;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::canned;
    pub use crate::config;
    pub use crate::llm;
    pub use crate::models;
    pub use crate::orchestrator;
    pub use crate::server;
    pub use crate::telemetry;
}
