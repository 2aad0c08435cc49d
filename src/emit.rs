//! Wire framing for [`PipelineEvent`]s.
//!
//! Server-Sent-Events frames for HTTP hosts, JSON lines for pipes and logs.

use crate::events::PipelineEvent;
use futures::stream::{Stream, StreamExt};

/// `event: <tag>\ndata: <json>\n\n`
pub fn to_sse(event: &PipelineEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.kind(), event.data())
}

/// `{"event": <tag>, ...data}` on one line, newline-terminated.
pub fn to_json_line(event: &PipelineEvent) -> String {
    let mut data = event.data();
    if let serde_json::Value::Object(map) = &mut data {
        map.insert("event".into(), event.kind().into());
    }
    format!("{data}\n")
}

/// Frame every event of `events` as SSE.
pub fn sse_stream<S>(events: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = PipelineEvent> + Send,
{
    events.map(|event| to_sse(&event))
}
