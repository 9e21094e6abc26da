use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use delivery_api_client::{CreateDestination, DeliveryApiClient, ReceiverClient};
use delivery_tunnel_runner::prelude::{
    HookResult, MetricsAggregator, RunnerContext, TunnelResult, VuContext,
};

use crate::config::{load_environment, EnvironmentConfig};
use crate::context::{HarnessVuContext, VuTenant};
use crate::publisher::{event_id, iteration_payload, EventPublisher, PublishOutcome};
use crate::runner_context::{HarnessRunnerContext, RunContext};
use crate::store::{InMemoryCorrelationStore, RedisCorrelationStore};
use crate::verifier::{DeliveryVerifier, PollSettings, VerifyOutcome};

/// Topic every harness event is published on.
pub const EVENT_TOPIC: &str = "user.created";

const HEALTHY_CHECK: &str = "status is 200";
const FAST_HEALTH_CHECK: &str = "response time < 1000ms";

/// Load `<config-dir>/environments/<environment>.json` unless an environment was already set.
pub fn load_environment_config(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    if ctx.get().has_environment() {
        return Ok(());
    }

    let env = load_environment(&ctx.cli().config_dir, &ctx.cli().environment)?;
    log::info!(
        "Using environment {} with API at {}",
        env.name,
        env.api.base_url
    );
    ctx.get_mut().set_environment(env);
    Ok(())
}

/// Create the [RunContext] for this run from the command line and the executor options.
pub fn configure_run(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let run = RunContext::new(
        ctx.run_id(),
        ctx.started_at(),
        ctx.executor_config().clone(),
    );
    log::info!("Run {} uses tenant {}", run.run_id, run.tenant_id);
    ctx.get_mut().set_run(run);
    Ok(())
}

/// Build the delivery API and receiver clients from the loaded environment.
pub fn configure_clients(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let env = ctx.get().environment()?.clone();
    let metrics = ctx.metrics().clone();

    let api = DeliveryApiClient::new(
        env.api.base_url.clone(),
        ctx.cli().api_key.clone(),
        env.api.timeout,
        metrics.clone(),
    )
    .context("Failed to create the delivery API client")?;
    let receiver = ReceiverClient::new(env.mock_webhook.url.clone(), env.api.timeout, metrics)
        .context("Failed to create the receiver client")?;

    ctx.get_mut().set_clients(api, receiver);
    Ok(())
}

/// Connect to the Redis correlation store named by the environment, unless a store was already set.
pub fn connect_correlation_store(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    if ctx.get().has_store() {
        return Ok(());
    }

    let connection_string = ctx.get().environment()?.redis.clone();
    let store = ctx.executor().execute_in_place(async move {
        RedisCorrelationStore::connect(&connection_string)
            .await
            .context("Unable to connect to the correlation store")
    })?;

    ctx.get_mut().set_store(Arc::new(store));
    Ok(())
}

/// Keep correlation records in process memory, for scenarios that publish and verify in the same
/// iteration and so never hand events to a later phase.
pub fn use_in_process_store(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    if !ctx.get().has_store() {
        ctx.get_mut()
            .set_store(Arc::new(InMemoryCorrelationStore::new()));
    }
    Ok(())
}

async fn provision(
    api: &DeliveryApiClient,
    metrics: &MetricsAggregator,
    tenant_id: &str,
    destination_url: String,
) -> anyhow::Result<String> {
    let created = api.upsert_tenant(tenant_id).await;
    metrics.check("tenant created", created.is_ok());
    created.with_context(|| format!("Failed to create tenant {tenant_id}"))?;

    let destination = api
        .create_destination(
            tenant_id,
            &CreateDestination::webhook(destination_url, vec![EVENT_TOPIC.to_string()]),
        )
        .await;
    metrics.check("destination created", destination.is_ok());
    let destination = destination
        .with_context(|| format!("Failed to create destination for tenant {tenant_id}"))?;

    Ok(destination.id)
}

fn poll_settings(env: &EnvironmentConfig) -> PollSettings {
    PollSettings {
        timeout: env.mock_webhook.verification_poll_timeout,
        interval: env.mock_webhook.verification_poll_interval,
    }
}

/// Create the run's tenant and a webhook destination pointing at the mock receiver.
///
/// Any failure here is fatal for the run.
pub fn provision_tenant_and_destination(
    ctx: &mut RunnerContext<HarnessRunnerContext>,
) -> HookResult {
    let api = ctx.get().api()?.clone();
    let tenant_id = ctx.get().run()?.tenant_id.clone();
    let destination_url = ctx.get().environment()?.mock_webhook.destination_url.clone();
    let metrics = ctx.metrics().clone();

    let destination_id = ctx.executor().execute_in_place(async move {
        provision(&api, &metrics, &tenant_id, destination_url).await
    })?;

    log::info!("Created destination {destination_id}");
    ctx.get_mut().run_mut()?.destination_id = Some(destination_id);
    Ok(())
}

/// Remove correlation keys left by an earlier run with the same run id and reset the counter.
pub fn reset_correlation_keys(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let store = ctx.get().store()?;
    let keys = ctx.get().run()?.keys();

    ctx.executor().execute_in_place(async move {
        let removed = store.delete_keys(&keys.run_keys()).await?;
        store.set_string(&keys.count(), "0").await?;
        log::debug!("Removed {removed} correlation keys from a previous run");
        Ok(())
    })
}

pub fn start_publisher(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let values = ctx.get();
    let run = values.run()?;
    let publisher = EventPublisher::new(
        values.api()?.clone(),
        values.store()?,
        run.keys(),
        run.tenant_id.clone(),
        EVENT_TOPIC,
        values.clock(),
        ctx.metrics().clone(),
    );
    ctx.get_mut().set_publisher(publisher);
    Ok(())
}

pub fn start_verifier(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let values = ctx.get();
    let run = values.run()?;
    let env = values.environment()?;
    let verifier = DeliveryVerifier::new(
        values.api()?.clone(),
        values.receiver()?.clone(),
        values.store()?,
        run.keys(),
        run.tenant_id.clone(),
        poll_settings(env),
        values.clock(),
        ctx.metrics().clone(),
    );
    ctx.get_mut().set_verifier(verifier);
    Ok(())
}

/// Publish one event identified by the VU and its iteration.
pub fn publish_event(
    ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>,
) -> TunnelResult<PublishOutcome> {
    let runner_context = ctx.runner_context().clone();
    let publisher = runner_context.get().publisher()?;
    let id = event_id(runner_context.run_id(), ctx.vu_id(), ctx.iteration());
    let payload = iteration_payload(ctx.vu_id(), ctx.iteration());

    let outcome = runner_context
        .executor()
        .execute_in_place(async { publisher.publish(&id, payload).await })?;

    match &outcome {
        PublishOutcome::Accepted(_) => ctx.get_mut().published += 1,
        PublishOutcome::Rejected { .. } => ctx.get_mut().rejected += 1,
    }
    Ok(outcome)
}

/// Pop the next published event and verify its delivery.
pub fn verify_next_event(
    ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>,
) -> TunnelResult<VerifyOutcome> {
    let runner_context = ctx.runner_context().clone();
    let verifier = runner_context.get().verifier()?;

    let outcome = runner_context
        .executor()
        .execute_in_place(async { verifier.verify_next().await })?;

    match &outcome {
        VerifyOutcome::Verified { .. } => ctx.get_mut().verified += 1,
        VerifyOutcome::Unverified(_) => ctx.get_mut().unverified += 1,
        VerifyOutcome::Empty | VerifyOutcome::NothingToVerify { .. } => ctx.get_mut().idle += 1,
    }
    Ok(outcome)
}

/// Create a tenant and destination owned by this VU, once, on its first iteration.
///
/// The tenant is `<run tenant>-<vu>`. A failure fails the iteration and is retried on the next one.
pub fn provision_vu_tenant(
    ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>,
) -> HookResult {
    if ctx.get().tenant.is_some() {
        return Ok(());
    }

    let runner_context = ctx.runner_context().clone();
    let values = runner_context.get();
    let run = values.run()?;
    let env = values.environment()?;
    let api = values.api()?.clone();
    let metrics = runner_context.metrics().clone();
    let tenant_id = format!("{}-{}", run.tenant_id, ctx.vu_id());
    let destination_url = env.mock_webhook.destination_url.clone();

    let destination_id = runner_context.executor().execute_in_place(provision(
        &api,
        &metrics,
        &tenant_id,
        destination_url,
    ))?;
    log::info!(
        "VU {} created tenant {tenant_id} with destination {destination_id}",
        ctx.vu_id()
    );

    let publisher = EventPublisher::new(
        api.clone(),
        values.store()?,
        run.keys(),
        tenant_id.clone(),
        EVENT_TOPIC,
        values.clock(),
        metrics.clone(),
    );
    let verifier = DeliveryVerifier::new(
        api,
        values.receiver()?.clone(),
        values.store()?,
        run.keys(),
        tenant_id.clone(),
        poll_settings(env),
        values.clock(),
        metrics,
    );

    ctx.get_mut().tenant = Some(VuTenant {
        tenant_id,
        destination_id,
        publisher,
        verifier,
    });
    Ok(())
}

/// Publish one event to this VU's tenant and wait for it to reach the receiver.
///
/// A rejected publish or an event not delivered within the poll timeout fails the iteration.
pub fn publish_and_verify_event(
    ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>,
) -> TunnelResult<VerifyOutcome> {
    provision_vu_tenant(ctx)?;

    let runner_context = ctx.runner_context().clone();
    let id = event_id(runner_context.run_id(), ctx.vu_id(), ctx.iteration());
    let Some(tenant) = ctx.get().tenant.as_ref() else {
        anyhow::bail!("VU {} has no tenant", ctx.vu_id());
    };
    let mut payload = iteration_payload(ctx.vu_id(), ctx.iteration());
    payload.insert("tenant_id".to_string(), tenant.tenant_id.clone().into());
    let publisher = tenant.publisher.clone();
    let verifier = tenant.verifier.clone();

    let (published, outcome) = runner_context.executor().execute_in_place(async {
        match publisher.publish(&id, payload).await? {
            PublishOutcome::Accepted(_) => Ok((true, Some(verifier.verify(&id).await?))),
            PublishOutcome::Rejected { .. } => Ok((false, None)),
        }
    })?;

    let tally = ctx.get_mut();
    if !published {
        tally.rejected += 1;
        anyhow::bail!("Event {id} was rejected by the delivery service");
    }
    tally.published += 1;

    match outcome {
        Some(outcome @ VerifyOutcome::Verified { .. }) => {
            tally.verified += 1;
            Ok(outcome)
        }
        Some(VerifyOutcome::Unverified(result)) => {
            tally.unverified += 1;
            anyhow::bail!(
                "Event {} was not delivered to the receiver in time",
                result.event_id
            )
        }
        other => anyhow::bail!("Event {id} could not be verified: {other:?}"),
    }
}

/// Call the delivery service's health endpoint and check the status and response time.
pub fn check_health(ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>) -> HookResult {
    let runner_context = ctx.runner_context();
    let api = runner_context.get().api()?;

    let started = Instant::now();
    let status = runner_context
        .executor()
        .execute_in_place(async { Ok(api.healthz().await?) })?;
    let elapsed = started.elapsed();

    let metrics = runner_context.metrics();
    if !metrics.check(HEALTHY_CHECK, status.as_u16() == 200) {
        log::error!("Health check returned {status}");
    }
    metrics.check(FAST_HEALTH_CHECK, elapsed < Duration::from_secs(1));
    Ok(())
}

pub fn log_vu_summary(ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>) -> HookResult {
    let tally = ctx.get();
    log::debug!(
        "VU {} finished: published={} rejected={} verified={} unverified={} idle={}",
        ctx.vu_id(),
        tally.published,
        tally.rejected,
        tally.verified,
        tally.unverified,
        tally.idle
    );
    Ok(())
}

/// Report how many events the publish phase left for the verify phase.
pub fn report_published_events(ctx: Arc<RunnerContext<HarnessRunnerContext>>) -> HookResult {
    let store = ctx.get().store()?;
    let run = ctx.get().run()?;
    let keys = run.keys();

    let (count, pending) = ctx.executor().execute_to_completion(async {
        let count = store.get_string(&keys.count()).await?;
        let pending = store.list_len(&keys.list()).await?;
        Ok((count, pending))
    })?;

    log::info!(
        "Published {} events for tenant {}, {pending} awaiting verification. Run the verify phase with TESTID={}",
        count.as_deref().unwrap_or("0"),
        run.tenant_id,
        run.run_id
    );
    Ok(())
}

/// Best effort removal of the run's correlation keys once every event has been verified.
///
/// Keys are kept while events are still pending so that verification can be resumed.
pub fn cleanup_correlation_keys(ctx: Arc<RunnerContext<HarnessRunnerContext>>) -> HookResult {
    let store = ctx.get().store()?;
    let keys = ctx.get().run()?.keys();

    let (pending, removed) = ctx.executor().execute_to_completion(async {
        let pending = store.list_len(&keys.list()).await?;
        if pending > 0 {
            return Ok((pending, 0));
        }
        Ok((0, store.delete_keys(&keys.run_keys()).await?))
    })?;

    if pending > 0 {
        log::info!(
            "{pending} events of run {} are still pending, keeping their correlation keys",
            ctx.run_id()
        );
    } else {
        log::info!("Removed {removed} correlation keys for run {}", ctx.run_id());
    }
    Ok(())
}
