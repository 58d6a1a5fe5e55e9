use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use volley_http::{ClientOptions, HttpClient};

use crate::config::ScenarioConfig;
use crate::error::Result;
use crate::planner::RequestPlanner;
use crate::request_metrics::{RequestOutcome, RunMetrics};
use crate::runner::{ProgressEvent, ProgressFn, run_executor};
use crate::summary::{RunState, RunSummary, collect_checks, collect_request_errors};
use crate::thresholds_eval::evaluate_thresholds;
use crate::token::{TokenEndpoint, TokenManager};

#[derive(Clone, Default)]
pub struct RunOptions {
    pub progress: Option<ProgressFn>,
}

/// Everything one iteration needs, shared by all VUs.
struct IterationContext {
    client: Arc<HttpClient>,
    planner: RequestPlanner,
    tokens: Option<Arc<TokenManager>>,
    metrics: Arc<RunMetrics>,
    sleep: Option<Duration>,
}

impl IterationContext {
    /// One request; returns whether its status was acceptable.
    async fn run_once(&self) -> bool {
        let ok = self.request().await;
        if let Some(sleep) = self.sleep {
            tokio::time::sleep(sleep).await;
        }
        ok
    }

    async fn request(&self) -> bool {
        let token = match &self.tokens {
            Some(tm) => match tm.valid_token().await {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping request: no access token");
                    self.metrics.record_auth_failure();
                    return false;
                }
            },
            None => None,
        };

        let req = self.planner.plan(token.as_deref());
        let acceptable = req.acceptable_statuses.clone();
        let check = req.check_name.clone();
        let method = req.method.clone();
        let url = req.url.clone();

        let started = Instant::now();
        let outcome = match self.client.request(req.into_http_request()).await {
            Ok(res) => RequestOutcome::from_response(&res, &acceptable),
            Err(err) => RequestOutcome::from_transport_error(&err, started.elapsed()),
        };

        self.metrics.record_request(&outcome);
        self.metrics.record_check(&check, outcome.success);

        if !outcome.success {
            tracing::warn!(
                %method,
                %url,
                status = ?outcome.status,
                acceptable = ?&*acceptable,
                duration_ms = outcome.duration_ms,
                error_kind = outcome.error_kind.as_deref().unwrap_or(""),
                body = %outcome.body_prefix,
                "request failed"
            );
        } else if outcome.status == Some(429) {
            tracing::info!(%method, %url, "rate limited (429) but accepted");
        }

        outcome.success
    }
}

fn emit(progress: Option<&ProgressFn>, state: RunState, elapsed: Duration) {
    tracing::info!(state = %state, elapsed = ?elapsed, "run state");
    if let Some(p) = progress {
        (p)(ProgressEvent::State { state, elapsed });
    }
}

/// Runs one resolved scenario through `Init → Setup → Running → Draining → Summarizing → Done`.
///
/// Fails only on setup errors (client construction, the initial token fetch). Request
/// failures and threshold violations are reported in the returned summary.
pub async fn run_scenario(scenario: Arc<ScenarioConfig>, opts: RunOptions) -> Result<RunSummary> {
    let progress = opts.progress;
    let started_at = SystemTime::now();
    let clock = Instant::now();

    emit(progress.as_ref(), RunState::Init, Duration::ZERO);
    let client = Arc::new(HttpClient::new(ClientOptions {
        insecure_skip_tls_verify: scenario.insecure_skip_tls_verify,
        ..ClientOptions::default()
    })?);
    let metrics = Arc::new(RunMetrics::new(&scenario.name, scenario.slow_threshold_ms));
    let planner = RequestPlanner::new(&scenario)?;

    emit(progress.as_ref(), RunState::Setup, clock.elapsed());
    let tokens = match &scenario.auth {
        Some(auth) => {
            let tm = Arc::new(TokenManager::new(
                client.clone(),
                TokenEndpoint::new(&auth.token_url, &auth.client_id, &auth.client_secret),
                metrics.clone(),
            ));
            if auth.refresh_token {
                tracing::info!("token will be fetched lazily by workers");
            } else {
                tm.prime().await?;
                tracing::info!("access token acquired");
            }
            Some(tm)
        }
        None => None,
    };

    let ctx = Arc::new(IterationContext {
        client,
        planner,
        tokens,
        metrics: metrics.clone(),
        sleep: scenario.sleep,
    });
    let iteration = move |_vu: u64| {
        let ctx = ctx.clone();
        async move { ctx.run_once().await }
    };

    let on_state = {
        let progress = progress.clone();
        move |state: RunState, elapsed: Duration| emit(progress.as_ref(), state, elapsed)
    };
    let report = run_executor(
        &scenario,
        metrics.clone(),
        iteration,
        progress.clone(),
        &on_state,
    )
    .await?;

    emit(progress.as_ref(), RunState::Summarizing, report.elapsed);
    let thresholds = evaluate_thresholds(metrics.registry(), &scenario.thresholds)?;
    let summary = RunSummary {
        scenario: scenario.name.clone(),
        executor: scenario.executor.kind().to_string(),
        started_at,
        elapsed: report.elapsed,
        final_state: RunState::Done,
        metrics: metrics.registry().summarize_merged(),
        checks: collect_checks(metrics.registry()),
        request_errors: collect_request_errors(metrics.registry()),
        thresholds,
        dropped_iterations: metrics.dropped_total(),
        incomplete_iterations: metrics.incomplete_total(),
    };

    emit(progress.as_ref(), RunState::Done, clock.elapsed());
    Ok(summary)
}
