// 增量 UTF-8 解码
// SSH 数据包可能把一个多字节字符切成两半，尾部不完整的字节留到下一次拼接

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码一段字节，返回可以立即输出的文本
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut output = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    output.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to 之前的部分已验证
                    output.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            output.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // 末尾是不完整序列
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        output
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
