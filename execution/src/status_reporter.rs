// Copyright 2022 Swarmdb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_base::FragmentInstanceId;
use common_base::Stoppable;
use common_exception::ErrorCode;
use common_exception::FirstErrorLatch;
use common_exception::Result;
use common_profile::ProfileNode;

/// Shared between a `FragmentExecutor` and its `StatusReporter`: the
/// executor marks itself done (successfully or not) here, and the
/// reporter samples it on its own schedule without coordinating
/// directly with the executor's run loop.
pub struct ReportState {
    profile: Arc<ProfileNode>,
    done: AtomicBool,
    error: FirstErrorLatch,
}

impl ReportState {
    pub fn create(profile: Arc<ProfileNode>) -> Arc<ReportState> {
        Arc::new(ReportState {
            profile,
            done: AtomicBool::new(false),
            error: FirstErrorLatch::new(),
        })
    }

    pub fn mark_finished(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn mark_failed(&self, err: ErrorCode) {
        self.error.latch(err);
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// The coordinator-facing side of a status report: in production this
/// is a `WorkerToCoordinator` RPC client, in tests a recorder.
/// Reports carry a strictly increasing `sequence` so the coordinator
/// can discard a late or duplicate delivery by comparing it to the
/// highest sequence already applied for that instance — the transport
/// beneath this trait offers no ordering guarantee of its own.
#[async_trait]
pub trait StatusReportSink: Send + Sync {
    async fn report(
        &self,
        instance_id: FragmentInstanceId,
        sequence: u64,
        done: bool,
        status: &Result<()>,
        profile_json: &str,
    ) -> Result<()>;
}

/// Periodically samples a fragment instance's profile and liveness and
/// reports it to the coordinator until the instance finishes (success
/// or failure) or the executor stops it early (query cancellation).
/// A single missed report is not retried — the next tick's report
/// supersedes it, since every report is a full snapshot rather than a
/// delta.
pub struct StatusReporter<S: StatusReportSink + 'static> {
    instance_id: FragmentInstanceId,
    state: Arc<ReportState>,
    sink: Arc<S>,
    period: Duration,
    sequence: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl<S: StatusReportSink + 'static> StatusReporter<S> {
    pub fn create(instance_id: FragmentInstanceId, state: Arc<ReportState>, sink: Arc<S>, period: Duration) -> Self {
        StatusReporter {
            instance_id,
            state,
            sink,
            period,
            sequence: Arc::new(AtomicU64::new(0)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    async fn send_once(state: &ReportState, sink: &S, instance_id: FragmentInstanceId, sequence: u64) {
        let done = state.is_done();
        let status: Result<()> = match state.error.get() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        let profile_json = state.profile.to_json().unwrap_or_default();
        if let Err(err) = sink.report(instance_id, sequence, done, &status, &profile_json).await {
            tracing::warn!(%err, instance = %instance_id, "status report delivery failed, will retry next tick");
        }
    }
}

#[async_trait]
impl<S: StatusReportSink + 'static> Stoppable for StatusReporter<S> {
    async fn start(&mut self) -> Result<()> {
        let state = self.state.clone();
        let sink = self.sink.clone();
        let instance_id = self.instance_id;
        let period = self.period;
        let sequence = self.sequence.clone();
        let stop_flag = self.stop_flag.clone();

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
                Self::send_once(&state, &sink, instance_id, seq).await;
                if state.is_done() {
                    break;
                }
            }
            // final report guarantees the coordinator observes completion
            // even if it arrives between two ticks.
            let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
            Self::send_once(&state, &sink, instance_id, seq).await;
        }));
        Ok(())
    }

    async fn stop(&mut self, force: bool) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if force {
                task.abort();
            } else {
                let _ = task.await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingSink {
        reports: Mutex<Vec<(u64, bool)>>,
    }

    #[async_trait]
    impl StatusReportSink for RecordingSink {
        async fn report(
            &self,
            _instance_id: FragmentInstanceId,
            sequence: u64,
            done: bool,
            _status: &Result<()>,
            _profile_json: &str,
        ) -> Result<()> {
            self.reports.lock().unwrap().push((sequence, done));
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_after_the_instance_marks_itself_finished() {
        let state = ReportState::create(Arc::new(ProfileNode::create("fragment")));
        let sink = Arc::new(RecordingSink { reports: Mutex::new(Vec::new()) });
        let mut reporter = StatusReporter::create(
            FragmentInstanceId::generate(),
            state.clone(),
            sink.clone(),
            Duration::from_millis(5),
        );
        reporter.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.mark_finished();
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.stop(false).await.unwrap();

        let reports = sink.reports.lock().unwrap();
        assert!(!reports.is_empty());
        assert!(reports.iter().any(|(_, done)| *done));
        // sequence numbers are strictly increasing.
        for w in reports.windows(2) {
            assert!(w[1].0 > w[0].0);
        }
    }

    #[tokio::test]
    async fn force_stop_aborts_without_waiting() {
        let state = ReportState::create(Arc::new(ProfileNode::create("fragment")));
        let sink = Arc::new(RecordingSink { reports: Mutex::new(Vec::new()) });
        let mut reporter = StatusReporter::create(
            FragmentInstanceId::generate(),
            state,
            sink,
            Duration::from_secs(3600),
        );
        reporter.start().await.unwrap();
        reporter.stop(true).await.unwrap();
    }
}
