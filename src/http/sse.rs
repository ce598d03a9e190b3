use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::engine::EngineHandle;

pub type SnapshotSse = Sse<BoxStream<'static, Result<Event, Infallible>>>;

/// Live `snapshot` events, one per accepted input.
pub fn snapshot_events(handle: &'static EngineHandle) -> SnapshotSse {
    let events = handle
        .snapshot_stream()
        .filter_map(|snapshot| async move {
            Event::default()
                .event("snapshot")
                .json_data(&snapshot)
                .ok()
                .map(Ok)
        })
        .boxed();

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("stride-keepalive"),
    )
}
