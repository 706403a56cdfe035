// 暂存文件

use std::path::PathBuf;

/// 由上传接口生成、等待传输到远端的本地文件
/// 每个 handle 只能被成功消费一次
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedFile {
    /// 不透明句柄（UUID）
    pub handle: String,
    pub byte_size: u64,
    pub local_path: PathBuf,
}
