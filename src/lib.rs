// SSHDeck - 多会话 SSH 终端管理器
//
// 每个会话 ID 对应一个后台会话任务，UI 通过事件桥收发按会话路由的事件和命令。

pub mod bridge;
pub mod models;
pub mod services;
pub mod ssh;
pub mod terminal;
