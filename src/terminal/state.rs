// 终端状态管理 - 封装 alacritty_terminal::Term

use std::sync::{Arc, Mutex, PoisonError};

use alacritty_terminal::event::{Event as AlacEvent, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::Config as TermConfig;
use alacritty_terminal::vte::ansi;
use alacritty_terminal::Term;
use tracing::trace;

use crate::models::TerminalSettings;

/// 终端尺寸信息
#[derive(Clone, Debug, PartialEq)]
pub struct TerminalSize {
    /// 单元格宽度 (pixels)
    pub cell_width: f32,
    /// 行高 (pixels)
    pub line_height: f32,
    /// 列数
    pub columns: usize,
    /// 行数
    pub lines: usize,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cell_width: 8.4,
            line_height: 17.0,
            columns: 80,
            lines: 24,
        }
    }
}

impl TerminalSize {
    /// 从容器像素尺寸计算终端尺寸，左侧 padding 不参与列数计算
    pub fn from_pixels(width: f32, height: f32, settings: &TerminalSettings) -> Self {
        let effective_width = width - settings.padding_left;
        let columns = (effective_width / settings.cell_width).floor().max(0.0) as usize;
        let lines = (height / settings.line_height).floor().max(0.0) as usize;

        Self {
            cell_width: settings.cell_width,
            line_height: settings.line_height,
            columns: columns.max(1),
            lines: lines.max(1),
        }
    }
}

impl Dimensions for TerminalSize {
    fn total_lines(&self) -> usize {
        self.lines
    }

    fn screen_lines(&self) -> usize {
        self.lines
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn last_column(&self) -> Column {
        Column(self.columns.saturating_sub(1))
    }

    fn bottommost_line(&self) -> Line {
        Line(self.lines as i32 - 1)
    }

    fn topmost_line(&self) -> Line {
        Line(0)
    }
}

/// 事件代理 - 收集终端要回写给远端的应答（光标位置查询等）
#[derive(Clone, Default)]
pub struct EventProxy {
    replies: Arc<Mutex<Vec<String>>>,
}

impl EventListener for EventProxy {
    fn send_event(&self, event: AlacEvent) {
        match event {
            AlacEvent::PtyWrite(text) => self
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(text),
            AlacEvent::Title(title) => trace!("[Terminal] Title changed: {}", title),
            AlacEvent::Bell => trace!("[Terminal] Bell"),
            _ => {}
        }
    }
}

/// 终端状态
pub struct TerminalState {
    /// alacritty 终端实例
    term: Term<EventProxy>,
    /// VTE 解析器
    parser: ansi::Processor,
    /// 当前尺寸
    size: TerminalSize,
    events: EventProxy,
}

impl TerminalState {
    /// 按给定尺寸创建终端
    pub fn new(size: TerminalSize) -> Self {
        let events = EventProxy::default();
        let term = Term::new(TermConfig::default(), &size, events.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            size,
            events,
        }
    }

    /// 获取当前尺寸
    pub fn size(&self) -> &TerminalSize {
        &self.size
    }

    /// 调整终端尺寸，返回尺寸是否变化
    pub fn resize(&mut self, new_size: TerminalSize) -> bool {
        if new_size.columns == self.size.columns && new_size.lines == self.size.lines {
            return false;
        }
        self.size = new_size.clone();
        self.term.resize(new_size);
        true
    }

    /// 向终端输入数据（来自远端）
    /// 使用 VTE 解析器解析 ANSI 序列，并更新终端状态
    pub fn input(&mut self, data: &[u8]) {
        self.parser.advance(&mut self.term, data);
    }

    /// 向终端输入字符串
    pub fn input_str(&mut self, s: &str) {
        self.input(s.as_bytes());
    }

    /// 取出终端产生的应答
    pub fn take_replies(&mut self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .events
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// 可见区域文本，行尾空白去掉，末尾空行省略
    pub fn screen_text(&self) -> String {
        let grid = self.term.grid();
        let mut lines: Vec<String> = (0..grid.screen_lines())
            .map(|line| {
                let row = &grid[Line(line as i32)];
                let text: String = (0..grid.columns()).map(|col| row[Column(col)].c).collect();
                text.trim_end().to_string()
            })
            .collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_pixels_subtracts_padding() {
        let settings = TerminalSettings {
            cell_width: 10.0,
            line_height: 20.0,
            padding_left: 8.0,
            ..Default::default()
        };
        let size = TerminalSize::from_pixels(808.0, 490.0, &settings);
        assert_eq!((size.columns, size.lines), (80, 24));
    }

    #[test]
    fn test_size_has_minimum_of_one_cell() {
        let settings = TerminalSettings::default();
        let size = TerminalSize::from_pixels(4.0, 3.0, &settings);
        assert_eq!((size.columns, size.lines), (1, 1));
    }

    #[test]
    fn test_input_renders_to_screen() {
        let mut state = TerminalState::new(TerminalSize::default());
        state.input_str("hello\r\n\x1b[31mworld\x1b[0m");
        assert_eq!(state.screen_text(), "hello\nworld");
    }

    #[test]
    fn test_cursor_position_query_produces_reply() {
        let mut state = TerminalState::new(TerminalSize::default());
        state.input_str("ab\x1b[6n");
        assert_eq!(state.take_replies(), vec!["\x1b[1;3R".to_string()]);
        assert!(state.take_replies().is_empty());
    }

    #[test]
    fn test_resize_only_when_changed() {
        let mut state = TerminalState::new(TerminalSize::default());
        assert!(!state.resize(TerminalSize::default()));
        assert!(state.resize(TerminalSize {
            columns: 100,
            lines: 30,
            ..Default::default()
        }));
        assert_eq!(state.size().columns, 100);
    }
}
