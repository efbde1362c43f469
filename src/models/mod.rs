// 数据模型模块

pub mod profile;
pub mod settings;

pub use profile::{ConnectionProfile, ProfilesConfig};
pub use settings::{AlgorithmSettings, AppSettings, ConnectionSettings, TerminalSettings};
