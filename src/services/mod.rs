// 后端服务

pub mod sftp;
pub mod staging;
pub mod storage;
