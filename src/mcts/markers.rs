//! 流式标记解析
//!
//! <think>…</think> 为内部推理，<search>…</search> 为外部检索请求。
//! 标记可能被 chunk 边界截断（开或闭标记只收到一半），滚动缓冲区扣留
//! 可能构成标记前缀的尾部字节，确认不是标记或标记完整后才冲刷，
//! 保证已冲刷文本永不被撤回或破坏。

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";
pub const SEARCH_OPEN: &str = "<search>";
pub const SEARCH_CLOSE: &str = "</search>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerState {
    Plain,
    InDeliberation,
    InToolDirective,
}

/// 解析产物
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerEvent {
    /// 面向用户的文本
    Text(String),
    /// think 块内部文本（思考轨迹）
    Deliberation(String),
    /// 完整的检索指令
    SearchQuery(String),
}

/// 标记流解析器：feed 喂入任意切分的 chunk，finish 冲刷收尾
pub struct MarkerParser {
    state: MarkerState,
    buf: String,
    directive: String,
}

/// buf 尾部可能构成某个标记前缀的最长长度
fn withheld_len(buf: &str, markers: &[&str]) -> usize {
    let max_hold = markers.iter().map(|m| m.len() - 1).max().unwrap_or(0);
    let take_max = max_hold.min(buf.len());
    for take in (1..=take_max).rev() {
        let pos = buf.len() - take;
        if !buf.is_char_boundary(pos) {
            continue;
        }
        let suffix = &buf[pos..];
        if markers.iter().any(|m| m.starts_with(suffix)) {
            return take;
        }
    }
    0
}

impl Default for MarkerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerParser {
    pub fn new() -> Self {
        Self {
            state: MarkerState::Plain,
            buf: String::new(),
            directive: String::new(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<MarkerEvent> {
        self.buf.push_str(chunk);
        let mut events = Vec::new();

        loop {
            match self.state {
                MarkerState::Plain => {
                    let think = self.buf.find(THINK_OPEN);
                    let search = self.buf.find(SEARCH_OPEN);
                    let first = match (think, search) {
                        (Some(t), Some(s)) if t <= s => Some((t, THINK_OPEN, MarkerState::InDeliberation)),
                        (_, Some(s)) => Some((s, SEARCH_OPEN, MarkerState::InToolDirective)),
                        (Some(t), None) => Some((t, THINK_OPEN, MarkerState::InDeliberation)),
                        (None, None) => None,
                    };
                    match first {
                        Some((idx, marker, next)) => {
                            if idx > 0 {
                                let text: String = self.buf.drain(..idx).collect();
                                events.push(MarkerEvent::Text(text));
                            }
                            self.buf.drain(..marker.len());
                            self.state = next;
                        }
                        None => {
                            let hold = withheld_len(&self.buf, &[THINK_OPEN, SEARCH_OPEN]);
                            let flush = self.buf.len() - hold;
                            if flush > 0 {
                                let text: String = self.buf.drain(..flush).collect();
                                events.push(MarkerEvent::Text(text));
                            }
                            break;
                        }
                    }
                }
                MarkerState::InDeliberation => match self.buf.find(THINK_CLOSE) {
                    Some(idx) => {
                        if idx > 0 {
                            let text: String = self.buf.drain(..idx).collect();
                            events.push(MarkerEvent::Deliberation(text));
                        }
                        self.buf.drain(..THINK_CLOSE.len());
                        self.state = MarkerState::Plain;
                    }
                    None => {
                        let hold = withheld_len(&self.buf, &[THINK_CLOSE]);
                        let flush = self.buf.len() - hold;
                        if flush > 0 {
                            let text: String = self.buf.drain(..flush).collect();
                            events.push(MarkerEvent::Deliberation(text));
                        }
                        break;
                    }
                },
                MarkerState::InToolDirective => match self.buf.find(SEARCH_CLOSE) {
                    Some(idx) => {
                        let head: String = self.buf.drain(..idx).collect();
                        self.directive.push_str(&head);
                        self.buf.drain(..SEARCH_CLOSE.len());
                        let query = self.directive.trim().to_string();
                        self.directive.clear();
                        if !query.is_empty() {
                            events.push(MarkerEvent::SearchQuery(query));
                        }
                        self.state = MarkerState::Plain;
                    }
                    None => {
                        let hold = withheld_len(&self.buf, &[SEARCH_CLOSE]);
                        let flush = self.buf.len() - hold;
                        if flush > 0 {
                            let head: String = self.buf.drain(..flush).collect();
                            self.directive.push_str(&head);
                        }
                        break;
                    }
                },
            }
        }

        events
    }

    /// 流结束：冲刷残余。未闭合的 <search> 仍按指令处理（模型常漏写闭标记）。
    pub fn finish(&mut self) -> Vec<MarkerEvent> {
        let mut events = Vec::new();
        match self.state {
            MarkerState::Plain => {
                if !self.buf.is_empty() {
                    events.push(MarkerEvent::Text(std::mem::take(&mut self.buf)));
                }
            }
            MarkerState::InDeliberation => {
                if !self.buf.is_empty() {
                    events.push(MarkerEvent::Deliberation(std::mem::take(&mut self.buf)));
                }
            }
            MarkerState::InToolDirective => {
                self.directive.push_str(&self.buf);
                self.buf.clear();
                let query = self.directive.trim().to_string();
                self.directive.clear();
                if !query.is_empty() {
                    events.push(MarkerEvent::SearchQuery(query));
                }
            }
        }
        self.state = MarkerState::Plain;
        events
    }
}

/// 从完整文本中剥离 think 块与 search 标记，留下面向用户的部分
pub fn visible_text(content: &str) -> String {
    let mut parser = MarkerParser::new();
    let mut events = parser.feed(content);
    events.extend(parser.finish());
    let mut out = String::new();
    for ev in events {
        if let MarkerEvent::Text(t) = ev {
            out.push_str(&t);
        }
    }
    out.trim().to_string()
}
