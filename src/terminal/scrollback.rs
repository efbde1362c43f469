// 会话输出缓冲
// 只保留最近 limit 个字符，用于前端重新挂载时回放

/// 按字符计数的追加式缓冲区，超出上限时丢弃最旧的数据
#[derive(Debug)]
pub struct Scrollback {
    buffer: String,
    /// buffer 中的字符数（避免每次追加都重新计数）
    chars: usize,
    limit: usize,
}

impl Scrollback {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            chars: 0,
            limit,
        }
    }

    pub fn push(&mut self, text: &str) {
        if self.limit == 0 || text.is_empty() {
            return;
        }
        self.buffer.push_str(text);
        self.chars += text.chars().count();

        if self.chars > self.limit {
            let excess = self.chars - self.limit;
            let cut = self
                .buffer
                .char_indices()
                .nth(excess)
                .map(|(index, _)| index)
                .unwrap_or(self.buffer.len());
            self.buffer.drain(..cut);
            self.chars = self.limit;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.chars = 0;
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// 字符数
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }
}
