// 终端尺寸

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_COLS, DEFAULT_ROWS};

/// 终端几何尺寸（字符行列 + 像素尺寸）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalGeometry {
    pub columns: u32,
    pub rows: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl TerminalGeometry {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    pub fn with_pixels(mut self, pixel_width: u32, pixel_height: u32) -> Self {
        self.pixel_width = pixel_width;
        self.pixel_height = pixel_height;
        self
    }

    /// 行列至少为 1，避免远端收到 0x0 窗口
    pub fn clamped(self) -> Self {
        Self {
            columns: self.columns.max(1),
            rows: self.rows.max(1),
            ..self
        }
    }
}
