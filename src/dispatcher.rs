//! Per-query control flow.
//!
//! Each inbound query goes through:
//! 1. Cache lookup (A questions only)
//! 2. Routing: ask the registry for an ordered candidate list
//! 3. One pass over the candidates, first good reply wins
//! 4. Build the reply and store A answers in the cache
//!
//! Transports handle the I/O, the dispatcher handles decisions.

use std::sync::Arc;
use std::time::Instant;

use hickory_proto::op::{Message, ResponseCode};
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::dns::{self, HEADER_LEN, Question};
use crate::stats::Stats;
use crate::transport::upstream::Exchange;
use crate::upstream::{UpstreamRegistry, UpstreamServer};

/// How a query was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Served from the response cache.
    Cached,
    /// Forwarded to this upstream.
    Forwarded(UpstreamServer),
    /// No candidate answered, or none were configured.
    Failed,
    /// The packet could not be parsed or carried no question.
    Malformed,
}

pub struct QueryDispatcher {
    registry: Arc<UpstreamRegistry>,
    cache: Arc<ResponseCache>,
    exchange: Arc<dyn Exchange>,
    stats: Arc<Stats>,
}

impl QueryDispatcher {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        cache: Arc<ResponseCache>,
        exchange: Arc<dyn Exchange>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            registry,
            cache,
            exchange,
            stats,
        }
    }

    /// Answer a raw query. Returns `None` only for packets too short to
    /// carry a query id.
    pub async fn handle(&self, raw: &[u8]) -> Option<Vec<u8>> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        let start = Instant::now();

        let request = match Message::from_vec(raw) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "unparseable query");
                self.stats.record_failed(elapsed_ms(start));
                return dns::format_error(raw);
            }
        };

        let (reply, outcome) = self.resolve(&request, raw).await;
        let elapsed = elapsed_ms(start);
        let domain = request
            .queries()
            .first()
            .map(|q| q.name().to_ascii())
            .unwrap_or_else(|| "<unknown>".to_string());

        match &outcome {
            Outcome::Cached => {
                self.stats.record_cached(elapsed);
                debug!(domain = %domain, total_ms = elapsed, "CACHED");
            }
            Outcome::Forwarded(server) => {
                self.stats.record_forwarded(elapsed);
                debug!(domain = %domain, server = %server, total_ms = elapsed, "FORWARDED");
            }
            Outcome::Failed | Outcome::Malformed => {
                self.stats.record_failed(elapsed);
                debug!(domain = %domain, code = %reply.response_code(), total_ms = elapsed, "FAILED");
            }
        }

        match dns::encode(&reply) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(domain = %domain, error = %e, "cannot encode reply");
                dns::encode(&dns::error_reply(&request, ResponseCode::ServFail))
                    .ok()
                    .or_else(|| dns::format_error(raw))
            }
        }
    }

    /// Build the reply for a parsed request. `raw` is forwarded verbatim.
    pub async fn resolve(&self, request: &Message, raw: &[u8]) -> (Message, Outcome) {
        let Some(question) = Question::from_message(request) else {
            return (
                dns::error_reply(request, ResponseCode::FormErr),
                Outcome::Malformed,
            );
        };

        if question.is_a() {
            if let Some(answers) = self.cache.lookup(&question.name) {
                let mut reply = dns::reply_to(request);
                reply.add_answers(answers.iter().cloned());
                return (reply, Outcome::Cached);
            }
        }

        let candidates = self.registry.candidates_for(&question.name);
        if candidates.is_empty() {
            warn!(domain = %question.name, "no upstream servers configured for this name");
            return (
                dns::error_reply(request, ResponseCode::ServFail),
                Outcome::Failed,
            );
        }

        let Some((server, upstream)) = self.forward(&question, &candidates, raw).await else {
            return (
                dns::error_reply(request, ResponseCode::ServFail),
                Outcome::Failed,
            );
        };

        if !question.is_a() {
            return (
                dns::error_reply(request, ResponseCode::NXDomain),
                Outcome::Forwarded(server),
            );
        }

        let mut reply = dns::reply_to(request);
        reply.add_answers(upstream.answers().iter().cloned());
        if !upstream.answers().is_empty() {
            self.cache.store(&question.name, upstream.answers());
        }
        (reply, Outcome::Forwarded(server))
    }

    /// Single pass over `candidates`; the first reply without a transport
    /// or protocol error wins.
    async fn forward(
        &self,
        question: &Question,
        candidates: &[UpstreamServer],
        raw: &[u8],
    ) -> Option<(UpstreamServer, Message)> {
        for server in candidates {
            match self.exchange.exchange(server, raw).await {
                Ok(reply) => return Some((server.clone(), reply)),
                Err(e) => {
                    warn!(domain = %question.name, server = %server, error = %e, "forwarding failed");
                }
            }
        }
        warn!(domain = %question.name, tried = candidates.len(), "all upstream servers failed");
        None
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
