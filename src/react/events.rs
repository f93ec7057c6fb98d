//! 过程事件：一次调用（start 或 resume）产生的有序事件序列
//!
//! 生产端经有界通道 await 发送，不丢事件；消费端断开后（通道关闭或取消令牌触发）生产立即停止。
//! 最终回复按空格切块：首块原样，其后每块带一个前导空格，顺序拼接即还原原文。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

pub const PROCESSING_REQUEST: &str = "🧠 **Processing your request...**";
pub const PROCESSING_RESPONSE: &str = "🧠 **Processing your response...**";
pub const PLANNING_NEXT_STEPS: &str = "🤔 **Planning next steps...**";

/// 单个过程事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// 即将规划
    Thinking(String),
    /// 首段回复文本出现前清除“思考中”提示
    ClearThinking,
    /// 即将执行工具（工具名）
    ToolCall(String),
    /// 最终回复的一块
    Response(String),
    Completed,
    /// 会话挂起，携带向人提出的问题；序列在此结束但不跟 End
    HumanInputNeeded(String),
    Error(String),
    End,
}

impl AgentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Thinking(_) => "thinking",
            AgentEvent::ClearThinking => "clear_thinking",
            AgentEvent::ToolCall(_) => "tool_call",
            AgentEvent::Response(_) => "response",
            AgentEvent::Completed => "completed",
            AgentEvent::HumanInputNeeded(_) => "human_input_needed",
            AgentEvent::Error(_) => "error",
            AgentEvent::End => "end",
        }
    }

    /// 展示给前端的内容
    pub fn display_content(&self) -> String {
        match self {
            AgentEvent::Thinking(text) | AgentEvent::Response(text) => text.clone(),
            AgentEvent::HumanInputNeeded(query) => query.clone(),
            AgentEvent::ToolCall(tool) => format!("🔧 **Executing:** {tool}"),
            AgentEvent::Error(msg) => format!("❌ **Error:** {msg}"),
            AgentEvent::ClearThinking | AgentEvent::Completed | AgentEvent::End => String::new(),
        }
    }
}

/// 线上帧：SSE 每条 `data:` 一个 JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl EventFrame {
    pub fn new(session_id: &str, event: &AgentEvent) -> Self {
        Self {
            kind: event.kind().to_string(),
            content: event.display_content(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// 按单个空格切块；空文本不产生块
pub fn chunk_response(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(' ')
        .enumerate()
        .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {word}") })
        .collect()
}

/// 流式节奏：块间延迟与步间延迟
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub chunk_delay: Duration,
    pub step_delay: Duration,
}

impl Pacing {
    pub fn new(chunk_delay_ms: u64, step_delay_ms: u64) -> Self {
        Self {
            chunk_delay: Duration::from_millis(chunk_delay_ms),
            step_delay: Duration::from_millis(step_delay_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(50, 100)
    }
}

/// 事件发送端：一次调用一个
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
    disconnected: CancellationToken,
    pacing: Pacing,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>, disconnected: CancellationToken, pacing: Pacing) -> Self {
        Self {
            tx,
            disconnected,
            pacing,
        }
    }

    /// 发送一个事件；消费端已断开时返回 ConsumerDisconnected
    pub async fn emit(&self, event: AgentEvent) -> Result<(), AgentError> {
        if self.disconnected.is_cancelled() {
            return Err(AgentError::ConsumerDisconnected);
        }
        tokio::select! {
            sent = self.tx.send(event) => sent.map_err(|_| {
                self.disconnected.cancel();
                AgentError::ConsumerDisconnected
            }),
            _ = self.disconnected.cancelled() => Err(AgentError::ConsumerDisconnected),
        }
    }

    /// 按块发送最终回复，块间按节奏延迟
    pub async fn emit_response(&self, text: &str) -> Result<(), AgentError> {
        for chunk in chunk_response(text) {
            self.emit(AgentEvent::Response(chunk)).await?;
            self.pause(self.pacing.chunk_delay).await?;
        }
        Ok(())
    }

    /// 步间停顿
    pub async fn pause_step(&self) -> Result<(), AgentError> {
        self.pause(self.pacing.step_delay).await
    }

    async fn pause(&self, delay: Duration) -> Result<(), AgentError> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.disconnected.cancelled() => Err(AgentError::ConsumerDisconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_response_lossless() {
        for text in [
            "Done.",
            "Learner  registered successfully",
            " leading and trailing ",
            "line one\nline two",
        ] {
            let chunks = chunk_response(text);
            assert_eq!(chunks.concat(), text);
            assert!(chunks.iter().skip(1).all(|c| c.starts_with(' ')));
        }
        assert!(chunk_response("").is_empty());
    }

    #[test]
    fn test_frame_content() {
        let frame = EventFrame::new("s1", &AgentEvent::Error("boom".into()));
        assert_eq!(frame.kind, "error");
        assert_eq!(frame.content, "❌ **Error:** boom");
        let frame = EventFrame::new("s1", &AgentEvent::ToolCall("search_schools".into()));
        assert_eq!(frame.content, "🔧 **Executing:** search_schools");
        let json = serde_json::to_value(EventFrame::new("s1", &AgentEvent::End)).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["content"], "");
        assert_eq!(json["session_id"], "s1");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_sink_stops_after_disconnect() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let sink = EventSink::new(tx, token.clone(), Pacing::none());
        sink.emit(AgentEvent::ClearThinking).await.unwrap();
        drop(rx);
        assert!(matches!(
            sink.emit(AgentEvent::End).await,
            Err(AgentError::ConsumerDisconnected)
        ));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_emit_response_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let sink = EventSink::new(tx, CancellationToken::new(), Pacing::none());
        sink.emit_response("a b  c").await.unwrap();
        drop(sink);
        let mut got = Vec::new();
        while let Some(ev) = rx.recv().await {
            got.push(ev);
        }
        assert_eq!(
            got,
            vec![
                AgentEvent::Response("a".into()),
                AgentEvent::Response(" b".into()),
                AgentEvent::Response(" ".into()),
                AgentEvent::Response(" c".into()),
            ]
        );
    }
}
