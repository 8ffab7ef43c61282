//! Response worker.
//!
//! Turns a `retrieval-result` into a `final-response` for the coordinator,
//! delegating the answer text to an [`AnswerGenerator`].

use std::sync::Arc;

use tracing::{info, warn};

use parley_core::message::{ErrorReport, FinalResponse, RetrievalResult};
use parley_core::{names, Envelope, Handler, Message, Outbox, Result, Worker};

use crate::text::{query_terms, sentences, term_hits};

/// Answer returned when the context does not cover the question
pub const NO_ANSWER: &str =
    "I don't have enough information in the uploaded documents to answer that.";

/// Produces answer text from a question and retrieved context.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, query: &str, context: &[String]) -> Result<String>;
}

/// Answers with the context sentences that share the most terms with the query.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl AnswerGenerator for ExtractiveGenerator {
    fn generate(&self, query: &str, context: &[String]) -> Result<String> {
        let terms = query_terms(query);
        let mut scored: Vec<(usize, usize, &str)> = context
            .iter()
            .flat_map(|chunk| sentences(chunk))
            .enumerate()
            .map(|(pos, s)| (term_hits(s, &terms), pos, s))
            .filter(|(hits, _, _)| *hits > 0)
            .collect();
        if scored.is_empty() {
            return Ok(NO_ANSWER.to_string());
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(self.max_sentences);
        // Present the picks in reading order
        scored.sort_by_key(|(_, pos, _)| *pos);

        let mut picked: Vec<&str> = Vec::with_capacity(scored.len());
        for (_, _, s) in scored {
            if !picked.contains(&s) {
                picked.push(s);
            }
        }
        Ok(picked.join(" "))
    }
}

pub struct ResponseWorker {
    generator: Arc<dyn AnswerGenerator>,
}

impl ResponseWorker {
    pub fn new(generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { generator }
    }

    fn on_retrieval_result(&self, envelope: &Envelope, result: &RetrievalResult, outbox: &dyn Outbox) {
        let query = result.query.trim();
        if query.is_empty() {
            warn!(target: "responder", "retrieval-result without a query");
            outbox.post(envelope.reply(
                names::RESPONDER,
                names::COORDINATOR,
                Message::Error(ErrorReport::new(
                    "Missing query in retrieval result.",
                    "Response generation",
                )),
            ));
            return;
        }

        match self.generator.generate(query, &result.retrieved_context) {
            Ok(answer) => {
                info!(
                    target: "responder",
                    query = %query,
                    sources = result.retrieved_context.len(),
                    answer_chars = answer.chars().count(),
                    "Generated answer"
                );
                outbox.post(envelope.reply(
                    names::RESPONDER,
                    names::COORDINATOR,
                    Message::FinalResponse(FinalResponse {
                        answer: answer.trim().to_string(),
                        source_chunks: result.retrieved_context.clone(),
                        source_metadata: result.source_metadata.clone(),
                        original_query: query.to_string(),
                    }),
                ));
            }
            Err(err) => {
                warn!(target: "responder", query = %query, error = %err, "Answer generation failed");
                outbox.post(envelope.reply(
                    names::RESPONDER,
                    names::COORDINATOR,
                    Message::Error(ErrorReport::new(
                        format!("Answer generation failed: {err}"),
                        format!("Query: '{query}'"),
                    )),
                ));
            }
        }
    }
}

impl Default for ResponseWorker {
    fn default() -> Self {
        Self::new(Arc::new(ExtractiveGenerator::default()))
    }
}

impl Handler for ResponseWorker {
    fn handle(&self, envelope: &Envelope, outbox: &dyn Outbox) -> Result<()> {
        match envelope.message() {
            Message::RetrievalResult(result) => self.on_retrieval_result(envelope, result, outbox),
            _ => {
                warn!(target: "responder", kind = %envelope.kind(), sender = %envelope.sender(), "Unrecognized message type");
            }
        }
        Ok(())
    }
}

impl Worker for ResponseWorker {
    fn name(&self) -> &str {
        names::RESPONDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ParleyError;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<Envelope>>);

    impl Outbox for Collect {
        fn post(&self, envelope: Envelope) {
            self.0.lock().unwrap().push(envelope);
        }
    }

    struct Failing;

    impl AnswerGenerator for Failing {
        fn generate(&self, _: &str, _: &[String]) -> Result<String> {
            Err(ParleyError::Worker("model offline".into()))
        }
    }

    fn retrieval(query: &str, context: &[&str]) -> Envelope {
        Envelope::with_correlation(
            names::RETRIEVAL,
            names::RESPONDER,
            "q-1",
            Message::RetrievalResult(RetrievalResult {
                query: query.into(),
                retrieved_context: context.iter().map(|s| s.to_string()).collect(),
                source_metadata: vec![],
            }),
        )
    }

    #[test]
    fn extractive_picks_matching_sentences_in_order() {
        let gen = ExtractiveGenerator::new(2);
        let context = vec![
            "Churn fell to 3%. The office moved.".to_string(),
            "Revenue grew 12%. Revenue churn was flat.".to_string(),
        ];
        let answer = gen.generate("revenue churn", &context).unwrap();
        assert_eq!(answer, "Churn fell to 3%. Revenue churn was flat.");
    }

    #[test]
    fn extractive_admits_missing_information() {
        let gen = ExtractiveGenerator::default();
        assert_eq!(gen.generate("pricing", &[]).unwrap(), NO_ANSWER);
        let context = vec!["Unrelated text.".to_string()];
        assert_eq!(gen.generate("pricing", &context).unwrap(), NO_ANSWER);
    }

    #[test]
    fn worker_replies_with_final_response() {
        let worker = ResponseWorker::default();
        let outbox = Collect(Mutex::new(Vec::new()));

        worker
            .handle(&retrieval("revenue?", &["Revenue grew."]), &outbox)
            .unwrap();

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receiver(), names::COORDINATOR);
        assert_eq!(sent[0].correlation_id(), "q-1");
        match sent[0].message() {
            Message::FinalResponse(r) => {
                assert_eq!(r.answer, "Revenue grew.");
                assert_eq!(r.original_query, "revenue?");
                assert_eq!(r.source_chunks, vec!["Revenue grew.".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn generator_failure_becomes_error_envelope() {
        let worker = ResponseWorker::new(Arc::new(Failing));
        let outbox = Collect(Mutex::new(Vec::new()));

        worker
            .handle(&retrieval("revenue?", &["Revenue grew."]), &outbox)
            .unwrap();

        let sent = outbox.0.lock().unwrap();
        match sent[0].message() {
            Message::Error(report) => {
                assert!(report.error.contains("model offline"));
                assert_eq!(report.context, "Query: 'revenue?'");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
