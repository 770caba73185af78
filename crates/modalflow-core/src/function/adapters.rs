//! Closure adapters for the fluent builder.
//!
//! Each adapter lifts a plain closure into the matching function trait so a
//! pipeline can be assembled without writing a struct per stage.

use crate::message::{FunctionResponse, Message};

use super::{
    FilterFunction, FunctionError, FunctionResult, KeyByFunction, MapFunction, SinkFunction,
    SourceFunction,
};

/// Lifts `FnMut() -> Option<Message>` into a [`SourceFunction`].
///
/// The closure is polled once per `execute`; `None` marks exhaustion. The
/// adapter buffers one look-ahead message so `has_next` can answer without
/// consuming data.
pub struct FnSource<F> {
    name: String,
    produce: F,
    pending: Option<Message>,
    exhausted: bool,
}

impl<F> FnSource<F>
where
    F: FnMut() -> Option<Message> + Send,
{
    /// Wraps a producing closure.
    pub fn new(name: impl Into<String>, produce: F) -> Self {
        Self { name: name.into(), produce, pending: None, exhausted: false }
    }

    fn refill(&mut self) {
        if self.pending.is_none() && !self.exhausted {
            match (self.produce)() {
                Some(msg) => self.pending = Some(msg),
                None => self.exhausted = true,
            }
        }
    }
}

impl<F> SourceFunction for FnSource<F>
where
    F: FnMut() -> Option<Message> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> FunctionResult {
        self.refill();
        let mut out = FunctionResponse::new();
        if let Some(msg) = self.pending.take() {
            out.add(msg);
        }
        Ok(out)
    }

    fn has_next(&mut self) -> bool {
        self.refill();
        self.pending.is_some()
    }
}

/// Lifts `FnMut(Message) -> Result<Message, FunctionError>` into a
/// [`MapFunction`].
pub struct FnMap<F> {
    name: String,
    transform: F,
}

impl<F> FnMap<F>
where
    F: FnMut(Message) -> Result<Message, FunctionError> + Send,
{
    /// Wraps a transforming closure.
    pub fn new(name: impl Into<String>, transform: F) -> Self {
        Self { name: name.into(), transform }
    }
}

impl<F> MapFunction for FnMap<F>
where
    F: FnMut(Message) -> Result<Message, FunctionError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        let mut out = FunctionResponse::new();
        for msg in input {
            out.add((self.transform)(msg)?);
        }
        Ok(out)
    }
}

/// Lifts `FnMut(Message) -> Vec<Message>` into a [`MapFunction`] suitable
/// for flat-map operators (0..N outputs per input).
pub struct FnFlatMap<F> {
    name: String,
    expand: F,
}

impl<F> FnFlatMap<F>
where
    F: FnMut(Message) -> Vec<Message> + Send,
{
    /// Wraps an expanding closure.
    pub fn new(name: impl Into<String>, expand: F) -> Self {
        Self { name: name.into(), expand }
    }
}

impl<F> MapFunction for FnFlatMap<F>
where
    F: FnMut(Message) -> Vec<Message> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        let mut out = FunctionResponse::new();
        for msg in input {
            for produced in (self.expand)(msg) {
                out.add(produced);
            }
        }
        Ok(out)
    }
}

/// Lifts a predicate `FnMut(&Message) -> bool` into a [`FilterFunction`].
pub struct FnFilter<F> {
    name: String,
    keep: F,
}

impl<F> FnFilter<F>
where
    F: FnMut(&Message) -> bool + Send,
{
    /// Wraps a predicate closure.
    pub fn new(name: impl Into<String>, keep: F) -> Self {
        Self { name: name.into(), keep }
    }
}

impl<F> FilterFunction for FnFilter<F>
where
    F: FnMut(&Message) -> bool + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> FunctionResult {
        let mut out = FunctionResponse::new();
        for msg in input {
            if (self.keep)(&msg) {
                out.add(msg);
            }
        }
        Ok(out)
    }
}

/// Lifts `FnMut(Message) -> Result<(), FunctionError>` into a
/// [`SinkFunction`].
pub struct FnSink<F> {
    name: String,
    consume: F,
}

impl<F> FnSink<F>
where
    F: FnMut(Message) -> Result<(), FunctionError> + Send,
{
    /// Wraps a consuming closure.
    pub fn new(name: impl Into<String>, consume: F) -> Self {
        Self { name: name.into(), consume }
    }
}

impl<F> SinkFunction for FnSink<F>
where
    F: FnMut(Message) -> Result<(), FunctionError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, input: FunctionResponse) -> Result<(), FunctionError> {
        for msg in input {
            (self.consume)(msg)?;
        }
        Ok(())
    }
}

/// Lifts `FnMut(&Message) -> String` into a [`KeyByFunction`].
pub struct FnKeyBy<F> {
    name: String,
    extract: F,
}

impl<F> FnKeyBy<F>
where
    F: FnMut(&Message) -> String + Send,
{
    /// Wraps a key-extraction closure.
    pub fn new(name: impl Into<String>, extract: F) -> Self {
        Self { name: name.into(), extract }
    }
}

impl<F> KeyByFunction for FnKeyBy<F>
where
    F: FnMut(&Message) -> String + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&mut self, message: &Message) -> Result<String, FunctionError> {
        Ok((self.extract)(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_source_exhausts_after_none() {
        let mut items = vec![Message::text(1, "a"), Message::text(2, "b")].into_iter();
        let mut src = FnSource::new("two", move || items.next());

        assert!(src.has_next());
        let first = src.execute().unwrap();
        assert_eq!(first.len(), 1);
        assert!(src.has_next());
        let second = src.execute().unwrap();
        assert_eq!(second.iter().next().unwrap().uid(), 2);
        assert!(!src.has_next());
    }

    #[test]
    fn fn_map_preserves_order() {
        let mut map = FnMap::new("upper", |mut m: Message| {
            let text = m.as_text().unwrap_or_default().to_uppercase();
            m.set_content(crate::message::Content::Text(text));
            Ok(m)
        });

        let mut input = FunctionResponse::new();
        input.add(Message::text(1, "a"));
        input.add(Message::text(2, "b"));

        let out = map.execute(input).unwrap();
        let texts: Vec<&str> = out.iter().filter_map(Message::as_text).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn fn_flat_map_expands() {
        let mut fm = FnFlatMap::new("split", |m: Message| {
            let uid = m.uid();
            m.as_text()
                .unwrap_or_default()
                .split(' ')
                .map(|w| Message::text(uid, w))
                .collect()
        });

        let out = fm
            .execute(FunctionResponse::from_message(Message::text(1, "a b c")))
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn fn_filter_keeps_subsequence() {
        let mut filter = FnFilter::new("even", |m: &Message| m.uid() % 2 == 0);
        let input: FunctionResponse = (0..5).map(|i| Message::text(i, "x")).collect();
        let out = filter.execute(input).unwrap();
        let uids: Vec<u64> = out.iter().map(Message::uid).collect();
        assert_eq!(uids, vec![0, 2, 4]);
    }

    #[test]
    fn fn_sink_consumes_everything() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink::new("collect", |m: Message| {
                seen.push(m.uid());
                Ok(())
            });
            let input: FunctionResponse = (0..3).map(|i| Message::text(i, "x")).collect();
            sink.execute(input).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
