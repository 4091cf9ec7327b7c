use crate::error::{Error, Result};
use crate::traits::{ChatDelta, ChatMessage, ProviderEvent, ProviderStream, ToolCall};
use futures_util::StreamExt;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Accumulating,
    Complete,
    Failed,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// One finished assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssembledTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn to_message(&self) -> ChatMessage {
        if self.tool_calls.is_empty() {
            ChatMessage::assistant(self.content.clone())
        } else {
            ChatMessage::assistant_with_tool_calls(self.content.clone(), self.tool_calls.clone())
        }
    }
}

/// Rebuilds a single chat turn from streamed deltas.
///
/// Text is concatenated in arrival order. Tool-call fragments are grouped by
/// slot index and each of their fields is concatenated across deltas.
#[derive(Debug)]
pub struct StreamAssembler {
    state: AssemblerState,
    content: String,
    slots: BTreeMap<usize, PartialToolCall>,
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Accumulating,
            content: String::new(),
            slots: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn push(&mut self, delta: ChatDelta) -> Result<()> {
        self.ensure_accumulating()?;

        if let Some(text) = delta.content {
            self.content.push_str(&text);
        }
        for fragment in delta.tool_calls {
            let slot = self.slots.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                slot.id.push_str(&id);
            }
            if let Some(name) = fragment.name {
                slot.name.push_str(&name);
            }
            if let Some(arguments) = fragment.arguments {
                slot.arguments.push_str(&arguments);
            }
        }
        Ok(())
    }

    /// Marks the turn as broken. Whatever was accumulated is discarded.
    pub fn fail(&mut self, reason: impl Into<String>) -> Error {
        self.state = AssemblerState::Failed;
        Error::Provider(reason.into())
    }

    /// Handles the end-of-stream marker and emits the finished turn with tool
    /// calls ordered by slot index.
    pub fn complete(&mut self) -> Result<AssembledTurn> {
        self.ensure_accumulating()?;
        self.state = AssemblerState::Complete;

        let tool_calls = std::mem::take(&mut self.slots)
            .into_iter()
            .map(|(slot, partial)| {
                let id = if partial.id.is_empty() {
                    format!("call_{slot}_{:x}", md5::compute(partial.arguments.as_bytes()))
                } else {
                    partial.id
                };
                ToolCall {
                    id,
                    name: partial.name,
                    arguments: partial.arguments,
                }
            })
            .collect();

        Ok(AssembledTurn {
            content: std::mem::take(&mut self.content),
            tool_calls,
        })
    }

    /// Pulls events until the end marker. A transport error or a stream that
    /// closes without the marker fails the turn rather than truncating it.
    pub async fn assemble(mut self, mut stream: ProviderStream) -> Result<AssembledTurn> {
        while let Some(event) = stream.next().await {
            match event {
                Ok(ProviderEvent::Delta(delta)) => self.push(delta)?,
                Ok(ProviderEvent::Done) => return self.complete(),
                Err(e) => return Err(self.fail(format!("stream interrupted: {e:#}"))),
            }
        }
        Err(self.fail("stream closed before end-of-stream marker"))
    }

    fn ensure_accumulating(&self) -> Result<()> {
        match self.state {
            AssemblerState::Accumulating => Ok(()),
            state => Err(Error::Provider(format!(
                "stream assembler is no longer accumulating ({state:?})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ToolCallDelta;
    use futures_util::stream;

    fn fragment(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        args: Option<&str>,
    ) -> ChatDelta {
        ChatDelta::tool_call(ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        })
    }

    fn events(items: Vec<anyhow::Result<ProviderEvent>>) -> ProviderStream {
        Box::pin(stream::iter(items))
    }

    #[test]
    fn split_arguments_are_concatenated() {
        let mut assembler = StreamAssembler::new();
        assembler
            .push(fragment(0, Some("call_1"), Some("calc__add"), Some(r#"{"a":1"#)))
            .unwrap();
        assembler.push(fragment(0, None, None, Some(r#","b":2}"#))).unwrap();

        let turn = assembler.complete().unwrap();
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].arguments, r#"{"a":1,"b":2}"#);
        assert_eq!(assembler.state(), AssemblerState::Complete);
    }

    #[test]
    fn ids_and_names_may_be_split_too() {
        let mut assembler = StreamAssembler::new();
        assembler.push(fragment(0, Some("call_"), Some("srv__"), None)).unwrap();
        assembler.push(fragment(0, Some("123"), Some("echo"), Some("{}"))).unwrap();

        let turn = assembler.complete().unwrap();
        assert_eq!(turn.tool_calls[0].id, "call_123");
        assert_eq!(turn.tool_calls[0].name, "srv__echo");
    }

    #[test]
    fn interleaved_slots_come_out_in_index_order() {
        let mut assembler = StreamAssembler::new();
        assembler.push(fragment(1, Some("b"), Some("second"), Some("{"))).unwrap();
        assembler.push(ChatDelta::text("Let me ")).unwrap();
        assembler.push(fragment(0, Some("a"), Some("first"), Some("{}"))).unwrap();
        assembler.push(ChatDelta::text("check.")).unwrap();
        assembler.push(fragment(1, None, None, Some("}"))).unwrap();

        let turn = assembler.complete().unwrap();
        assert_eq!(turn.content, "Let me check.");
        let names: Vec<&str> = turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(turn.tool_calls[1].arguments, "{}");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut assembler = StreamAssembler::new();
        assembler.push(fragment(2, None, Some("x__y"), Some("{}"))).unwrap();
        let turn = assembler.complete().unwrap();
        assert!(turn.tool_calls[0].id.starts_with("call_2_"));
    }

    #[test]
    fn rejects_input_after_completion() {
        let mut assembler = StreamAssembler::new();
        assembler.complete().unwrap();
        assert!(assembler.push(ChatDelta::text("late")).is_err());
        assert!(assembler.complete().is_err());
    }

    #[test]
    fn turn_message_keeps_tool_calls() {
        let turn = AssembledTurn {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "c1".into(),
                name: "a__b".into(),
                arguments: "{}".into(),
            }],
        };
        let message = turn.to_message();
        assert!(message.has_tool_calls());
        assert_eq!(message.tool_calls.unwrap()[0].id, "c1");
    }

    #[tokio::test]
    async fn assemble_reads_until_done() {
        let stream = events(vec![
            Ok(ProviderEvent::Delta(ChatDelta::text("Hel"))),
            Ok(ProviderEvent::Delta(ChatDelta::text("lo"))),
            Ok(ProviderEvent::Done),
            Ok(ProviderEvent::Delta(ChatDelta::text("ignored"))),
        ]);
        let turn = StreamAssembler::new().assemble(stream).await.unwrap();
        assert_eq!(turn.content, "Hello");
        assert!(!turn.has_tool_calls());
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let stream = events(vec![
            Ok(ProviderEvent::Delta(ChatDelta::text("partial"))),
            Err(anyhow::anyhow!("connection reset")),
        ]);
        let err = StreamAssembler::new().assemble(stream).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn missing_end_marker_is_an_error() {
        let stream = events(vec![Ok(ProviderEvent::Delta(ChatDelta::text("partial")))]);
        let err = StreamAssembler::new().assemble(stream).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
