use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use folio_chat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::{self, Content, GenerateContentChunk};

struct PartialState {
    sse: Sse,
    // A single chunk may carry both text and the finish reason, so events
    // decoded from it are queued and handed out one at a time.
    pending_events: VecDeque<ModelResponseEvent>,
    completed: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streamed reply from `streamGenerateContent`.
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            completed: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.completed {
            return Ok((None, partial_state));
        }

        let data = match partial_state.sse.next_event().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                // The stream may end without an explicit finish reason, e.g.
                // when the prompt itself was blocked.
                partial_state.completed = true;
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {data}");

        let chunk = serde_json::from_str::<GenerateContentChunk>(&data)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        apply_chunk(&mut partial_state, chunk)?;
    }
}

fn apply_chunk(
    partial_state: &mut PartialState,
    chunk: GenerateContentChunk,
) -> Result<(), Error> {
    if let Some(err) = chunk.error {
        let kind = match err.code {
            Some(401 | 403) => ErrorKind::Unauthenticated,
            Some(429) => ErrorKind::RateLimitExceeded,
            _ => ErrorKind::Other,
        };
        let message = err
            .message
            .or(err.status)
            .unwrap_or_else(|| "unknown error".to_owned());
        return Err(Error::new(message, kind));
    }

    if let Some(block_reason) =
        chunk.prompt_feedback.and_then(|f| f.block_reason)
    {
        warn!("prompt was blocked: {block_reason}");
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::Completed(ModelFinishReason::Safety));
        partial_state.completed = true;
        return Ok(());
    }

    if let Some(usage) = chunk.usage_metadata {
        debug!(
            "usage: prompt {:?}, reply {:?}, total {:?} tokens",
            usage.prompt_token_count,
            usage.candidates_token_count,
            usage.total_token_count
        );
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(());
    };
    let text = candidate.content.as_ref().and_then(Content::text);
    if let Some(text) = text.filter(|text| !text.is_empty()) {
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::MessageDelta(text));
    }
    if let Some(reason) = candidate.finish_reason {
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::Completed(proto::finish_reason(
                &reason,
            )));
        partial_state.completed = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use folio_chat_model::ModelProviderError;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        body: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks =
            Chunks::from_vec_deque(vec![Bytes::from_static(body)].into());
        let mut resp = pin!(GeminiResponse::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_simple_events() {
        let events = collect(include_bytes!("../fixtures/stream_reply.txt"))
            .await
            .unwrap();
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello. I am CORE, ⛓️ how can I help?");
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let events = collect(
            b"data: {\"promptFeedback\": {\"blockReason\": \"OTHER\"}}\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![ModelResponseEvent::Completed(ModelFinishReason::Safety)]
        );
    }

    #[tokio::test]
    async fn test_stream_without_finish_reason() {
        let events = collect(
            b"data: {\"candidates\": [{\"content\": {\"parts\": []}}]}\n\n",
        )
        .await
        .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_error_chunk() {
        let err = collect(
            b"data: {\"error\": {\"code\": 429, \"message\": \"quota\"}}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "quota");
    }
}
