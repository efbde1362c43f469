// Terminal 模块 - 基于 alacritty_terminal 的终端模拟器与会话输出缓冲

mod decoder;
mod frontend;
mod scrollback;
mod state;

pub use decoder::Utf8Decoder;
pub use frontend::{Notification, NotificationKind, TerminalFrontend};
pub use scrollback::Scrollback;
pub use state::{EventProxy, TerminalSize, TerminalState};
