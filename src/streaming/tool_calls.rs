//! Tool-call assembly
//!
//! Providers stream function-call arguments as arbitrary text fragments keyed
//! by a call index. The assembler buffers them and releases a call exactly once,
//! as soon as it has a name and its argument text parses as a JSON object.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::LlmError;

/// How to treat calls still buffered when the stream stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Definitive end of generation: an incomplete call is an error.
    Strict,
    /// Ambiguous ending: incomplete calls are discarded.
    Lenient,
}

/// A call whose arguments are a complete JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCall {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    hinted: bool,
}

/// Per-stream buffer of partially received tool calls.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<usize, PendingCall>,
    completed: BTreeSet<usize>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment and return the call if it just became complete.
    ///
    /// Fragments for an index that was already emitted are ignored.
    pub fn push_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Option<ReadyCall> {
        if self.completed.contains(&index) {
            tracing::debug!(index, "ignoring fragment for completed tool call");
            return None;
        }

        let call = self.pending.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id.get_or_insert_with(|| id.to_string());
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            call.name.get_or_insert_with(|| name.to_string());
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }

        self.try_complete(index, false)
    }

    /// Name and id of a call whose name just became known, at most once per call.
    pub fn take_begin_hint(&mut self, index: usize) -> Option<(Option<String>, String)> {
        let call = self.pending.get_mut(&index)?;
        if call.hinted {
            return None;
        }
        let name = call.name.clone()?;
        call.hinted = true;
        Some((call.id.clone(), name))
    }

    /// Close one call explicitly (a provider's "block stop").
    ///
    /// Empty arguments count as `{}`; anything else that is not a JSON object
    /// fails with `ToolCallAssemblyError`.
    pub fn finish_call(&mut self, index: usize) -> Result<Option<ReadyCall>, LlmError> {
        if self.completed.contains(&index) || !self.pending.contains_key(&index) {
            return Ok(None);
        }
        match self.try_complete(index, true) {
            Some(call) => Ok(Some(call)),
            None => {
                let call = self.pending.remove(&index).unwrap_or_default();
                Err(assembly_error(index, &call))
            }
        }
    }

    /// Flush every buffered call at the end of a stream.
    pub fn flush(&mut self, mode: FlushMode) -> Result<Vec<ReadyCall>, LlmError> {
        let indices: Vec<usize> = self.pending.keys().copied().collect();
        let mut ready = Vec::new();
        for index in indices {
            if let Some(call) = self.try_complete(index, true) {
                ready.push(call);
                continue;
            }
            let Some(call) = self.pending.remove(&index) else {
                continue;
            };
            match mode {
                FlushMode::Strict => return Err(assembly_error(index, &call)),
                FlushMode::Lenient => {
                    tracing::warn!(
                        index,
                        name = call.name.as_deref().unwrap_or(""),
                        "dropping incomplete tool call at end of stream"
                    );
                }
            }
        }
        Ok(ready)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    fn try_complete(&mut self, index: usize, empty_is_object: bool) -> Option<ReadyCall> {
        let call = self.pending.get(&index)?;
        let name = call.name.as_deref().filter(|n| !n.is_empty())?;
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() && empty_is_object {
            "{}".to_string()
        } else if is_json_object(raw) {
            raw.to_string()
        } else {
            return None;
        };

        let ready = ReadyCall {
            index,
            id: call
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: name.to_string(),
            arguments,
        };
        self.pending.remove(&index);
        self.completed.insert(index);
        Some(ready)
    }
}

fn is_json_object(raw: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw).is_ok_and(|v| v.is_object())
}

fn assembly_error(index: usize, call: &PendingCall) -> LlmError {
    let snippet: String = call.arguments.chars().take(120).collect();
    LlmError::ToolCallAssemblyError {
        index: index.to_string(),
        snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_once_arguments_form_an_object() {
        let mut asm = ToolCallAssembler::new();
        assert!(
            asm.push_fragment(0, Some("call_1"), Some("lookup"), Some("{\"a\":"))
                .is_none()
        );
        let call = asm.push_fragment(0, None, None, Some("1}")).unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, "{\"a\":1}");

        // late duplicate fragment for the same index
        assert!(asm.push_fragment(0, None, None, Some("{\"a\":1}")).is_none());
        assert!(!asm.has_pending());
        assert!(asm.is_completed(0));
    }

    #[test]
    fn arrays_and_primitives_are_not_arguments() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm.push_fragment(0, None, Some("f"), Some("[1,2]")).is_none());
        assert!(asm.push_fragment(1, None, Some("g"), Some("42")).is_none());
        assert!(asm.has_pending());
    }

    #[test]
    fn call_without_name_waits_for_it() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm.push_fragment(0, Some("id"), None, Some("{}")).is_none());
        let call = asm.push_fragment(0, None, Some("late_name"), None).unwrap();
        assert_eq!(call.name, "late_name");
    }

    #[test]
    fn lenient_flush_drops_invalid_calls() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(0, Some("c"), Some("f"), Some("{\"a\":"));
        assert_eq!(asm.flush(FlushMode::Lenient).unwrap(), Vec::new());
        assert!(!asm.has_pending());
    }

    #[test]
    fn strict_flush_names_offending_call() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(3, Some("c"), Some("f"), Some("{\"a\":"));
        match asm.flush(FlushMode::Strict) {
            Err(LlmError::ToolCallAssemblyError { index, snippet }) => {
                assert_eq!(index, "3");
                assert_eq!(snippet, "{\"a\":");
            }
            other => panic!("expected assembly error, got {other:?}"),
        }
    }

    #[test]
    fn flush_releases_calls_with_empty_arguments() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(0, None, Some("now"), Some(""));
        let calls = asm.flush(FlushMode::Strict).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "{}");
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn finish_call_is_strict_for_single_block() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(1, Some("toolu_1"), Some("f"), None);
        let call = asm.finish_call(1).unwrap().unwrap();
        assert_eq!(call.arguments, "{}");

        asm.push_fragment(2, Some("toolu_2"), Some("g"), Some("{\"x\""));
        assert!(asm.finish_call(2).is_err());
        assert!(asm.finish_call(9).unwrap().is_none());
    }

    #[test]
    fn begin_hint_fires_once_per_call() {
        let mut asm = ToolCallAssembler::new();
        asm.push_fragment(0, Some("c"), None, Some("{"));
        assert!(asm.take_begin_hint(0).is_none());
        asm.push_fragment(0, None, Some("search"), None);
        assert_eq!(
            asm.take_begin_hint(0),
            Some((Some("c".to_string()), "search".to_string()))
        );
        assert!(asm.take_begin_hint(0).is_none());
    }
}
