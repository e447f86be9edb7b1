//! 配置管理模块
//!
//! 提供配置文件解析、环境变量覆盖和验证功能

pub mod loader;
pub mod types;

// 重新导出主要类型
pub use loader::{
    default_config_template, get_default_config_path, ConfigLoader, TomlConfigLoader,
    DEFAULT_CONFIG_FILE,
};
pub use types::{
    validate_config, CheckerConfig, Config, LoggingConfig, NotifierConfig, ServerConfig,
};
