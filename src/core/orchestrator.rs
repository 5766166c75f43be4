//! The pipeline state machine.
//!
//! Sequences input check, retrieval, the Maker-Checker refinement loop,
//! and the output check, appending exactly one audit-trail entry per
//! executed stage transition. Guard rejections terminate immediately;
//! infrastructure failures are distinct terminal states, never dressed
//! up as policy decisions.
//!
//! Capability handles are injected once at construction and shared
//! read-only across runs; each run owns its record and counters, so
//! concurrent runs share no mutable state. Entries are appended between
//! suspension points, which keeps the record a valid prefix if a run is
//! cancelled mid-flight.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::Retriever;
use crate::agents::{Checker, Maker};
use crate::config::PipelineConfig;
use crate::domain::{
    AuditStatus, FailureKind, GuardStage, PipelineRecord, PipelineResult, SealedOutcome, Stage,
    StageEntry, VerdictSnapshot,
};
use crate::guards::{InputGuard, OutputGuard};

use super::retry::{run_stage, StageFailure};

/// The Maker-Checker pipeline orchestrator.
pub struct Orchestrator {
    input_guard: Arc<dyn InputGuard>,
    retriever: Arc<dyn Retriever>,
    maker: Arc<dyn Maker>,
    checker: Arc<dyn Checker>,
    output_guard: Arc<dyn OutputGuard>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        input_guard: Arc<dyn InputGuard>,
        retriever: Arc<dyn Retriever>,
        maker: Arc<dyn Maker>,
        checker: Arc<dyn Checker>,
        output_guard: Arc<dyn OutputGuard>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            input_guard,
            retriever,
            maker,
            checker,
            output_guard,
            config,
        }
    }

    /// Run one query through the pipeline to a terminal result.
    #[instrument(skip(self, query))]
    pub async fn run(&self, query: &str) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let snap = self.config.snapshot_max_chars;
        let deadline = self.config.stage_timeout();
        let mut record = PipelineRecord::begin(run_id, query, snap);

        info!(%run_id, "starting pipeline run");

        // INPUT_CHECK. The guard itself is infallible (classifier
        // errors fail closed inside it); only a deadline overrun is an
        // infrastructure failure here.
        let started = Instant::now();
        let verdict = match tokio::time::timeout(deadline, self.input_guard.validate(query)).await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                return self.fail(
                    record,
                    Stage::InputCheck,
                    FailureKind::Timeout,
                    1,
                    started,
                    query,
                    "input guard exceeded its deadline",
                );
            }
        };

        record.push(
            StageEntry::new(
                Stage::InputCheck,
                1,
                query,
                if verdict.passed { "pass" } else { "blocked" },
                Some(VerdictSnapshot::Safety(verdict.clone())),
                snap,
            )
            .with_duration(elapsed_ms(started)),
        );

        if !verdict.passed {
            error!(
                %run_id,
                categories = %verdict.categories(),
                severity = %verdict.severity,
                "query blocked by input guard"
            );
            record.seal(SealedOutcome::Rejected {
                stage: GuardStage::Input,
            });
            return PipelineResult::Rejected {
                stage: GuardStage::Input,
                verdict,
                record,
            };
        }

        // RETRIEVE
        let started = Instant::now();
        let bundle = match run_stage(Stage::Retrieve, deadline, &self.config.retry, || {
            self.retriever.retrieve(query)
        })
        .await
        {
            Ok(bundle) => bundle,
            Err(failure) => return self.fail_stage(record, failure, 1, started, query),
        };

        if let Err(violation) = bundle.validate() {
            return self.fail(
                record,
                Stage::Retrieve,
                FailureKind::Contract,
                1,
                started,
                query,
                &violation,
            );
        }

        record.push(
            StageEntry::new(Stage::Retrieve, 1, query, &bundle.summary(), None, snap)
                .with_duration(elapsed_ms(started)),
        );

        // GENERATE / AUDIT refinement loop. At most `refine_limit`
        // additional Maker attempts beyond the first.
        let mut attempt: u32 = 1;
        let mut feedback: Option<String> = None;

        let (answer, audit_status) = loop {
            let gen_input = match &feedback {
                Some(f) => format!("{}\n[refinement feedback] {}", query, f),
                None => query.to_string(),
            };

            let started = Instant::now();
            let answer = match run_stage(Stage::Generate, deadline, &self.config.retry, || {
                self.maker.generate(query, &bundle, feedback.as_deref())
            })
            .await
            {
                Ok(answer) => answer,
                Err(failure) => {
                    return self.fail_stage(record, failure, attempt, started, &gen_input)
                }
            };

            record.push(
                StageEntry::new(Stage::Generate, attempt, &gen_input, &answer, None, snap)
                    .with_duration(elapsed_ms(started)),
            );

            let started = Instant::now();
            let audit = match run_stage(Stage::Audit, deadline, &self.config.retry, || {
                self.checker.audit(query, &bundle, &answer)
            })
            .await
            {
                Ok(audit) => audit,
                Err(failure) => return self.fail_stage(record, failure, attempt, started, &answer),
            };

            record.push(
                StageEntry::new(
                    Stage::Audit,
                    attempt,
                    &answer,
                    "",
                    Some(VerdictSnapshot::Audit(audit.clone())),
                    snap,
                )
                .with_duration(elapsed_ms(started)),
            );

            if audit.accepted {
                break (answer, AuditStatus::Verified);
            }

            if attempt > self.config.refine_limit {
                // Deliberate exposed degradation: the answer ships, but
                // flagged so callers can tell it from a verified one.
                warn!(
                    %run_id,
                    attempts = attempt,
                    "refinement budget exhausted; delivering unaudited answer"
                );
                break (answer, AuditStatus::Unaudited);
            }

            info!(%run_id, attempt, feedback = %audit.feedback, "draft rejected; refining");
            feedback = Some(audit.feedback);
            attempt += 1;
        };

        // A citation the Checker approved must name a passage we
        // actually retrieved. Surfaced as a broken invariant, never
        // silently corrected.
        if audit_status == AuditStatus::Verified {
            let unknown = bundle.unknown_citations(&answer);
            if !unknown.is_empty() {
                error!(
                    %run_id,
                    ids = %unknown.join(", "),
                    "accepted answer cites sources outside the bundle"
                );
                record.seal(SealedOutcome::Failed {
                    kind: FailureKind::Contract,
                });
                return PipelineResult::Failed {
                    kind: FailureKind::Contract,
                    stage: Stage::Audit,
                    record,
                };
            }
        }

        // OUTPUT_CHECK. Independent of the audit: a Checker-approved
        // answer can still be blocked here.
        let started = Instant::now();
        let (sanitized, out_verdict) =
            match tokio::time::timeout(deadline, self.output_guard.review(&answer)).await {
                Ok(pair) => pair,
                Err(_) => {
                    return self.fail(
                        record,
                        Stage::OutputCheck,
                        FailureKind::Timeout,
                        1,
                        started,
                        &answer,
                        "output guard exceeded its deadline",
                    );
                }
            };

        record.push(
            StageEntry::new(
                Stage::OutputCheck,
                1,
                &answer,
                &sanitized,
                Some(VerdictSnapshot::Safety(out_verdict.clone())),
                snap,
            )
            .with_duration(elapsed_ms(started)),
        );

        if !out_verdict.passed {
            error!(
                %run_id,
                categories = %out_verdict.categories(),
                "answer blocked by output guard"
            );
            record.seal(SealedOutcome::Rejected {
                stage: GuardStage::Output,
            });
            return PipelineResult::Rejected {
                stage: GuardStage::Output,
                verdict: out_verdict,
                record,
            };
        }

        record.seal(SealedOutcome::Answered {
            audited: audit_status == AuditStatus::Verified,
        });
        info!(%run_id, audit = ?audit_status, "pipeline run completed");

        PipelineResult::Answered {
            answer: sanitized,
            audit: audit_status,
            record,
        }
    }

    fn fail_stage(
        &self,
        record: PipelineRecord,
        failure: StageFailure,
        attempt: u32,
        started: Instant,
        input: &str,
    ) -> PipelineResult {
        let message = failure.to_string();
        self.fail(
            record,
            failure.stage(),
            failure.kind(),
            attempt,
            started,
            input,
            &message,
        )
    }

    /// Terminal infrastructure/contract failure: the failing stage still
    /// gets its record entry so the trail is never truncated.
    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        mut record: PipelineRecord,
        stage: Stage,
        kind: FailureKind,
        attempt: u32,
        started: Instant,
        input: &str,
        message: &str,
    ) -> PipelineResult {
        error!(%stage, %kind, detail = message, "pipeline run failed");

        record.push(
            StageEntry::new(
                stage,
                attempt,
                input,
                "",
                None,
                self.config.snapshot_max_chars,
            )
            .with_duration(elapsed_ms(started))
            .with_error(message),
        );
        record.seal(SealedOutcome::Failed { kind });

        PipelineResult::Failed {
            kind,
            stage,
            record,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
