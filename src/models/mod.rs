// 数据模型模块

pub mod profile;
pub mod settings;
pub mod staged;
pub mod terminal;

pub use profile::ConnectionProfile;
pub use settings::AppSettings;
pub use staged::StagedFile;
pub use terminal::TerminalGeometry;
