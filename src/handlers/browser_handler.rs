//! handlers/browser_handler.rs
//! Corrida repartida en shards, un navegador (perfil) por shard. El ledger es
//! compartido: dos shards nunca envían a la misma identidad.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::app_config::{BrowserProfile, BrowserSettings};
use crate::error::OutreachResult;
use crate::models::channel_model::ChannelConfig;
use crate::models::identity_model::IdentityKind;
use crate::models::outcome_model::{RunReport, RunSummary};
use crate::models::target_model::Target;
use crate::services::batch_service::BatchDriver;
use crate::services::browser_service::BrowserSession;
use crate::services::delivery_service::MessageTransport;
use crate::services::instagram_service::{InstagramTransport, INSTAGRAM_URL};
use crate::services::ledger_service::SharedLedger;
use crate::services::source_service::TargetSource;
use crate::services::whatsapp_service::{WhatsAppTransport, WHATSAPP_WEB_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserChannel {
    WhatsApp,
    Instagram,
}

impl BrowserChannel {
    pub fn endpoint(self) -> &'static str {
        match self {
            BrowserChannel::WhatsApp => WHATSAPP_WEB_URL,
            BrowserChannel::Instagram => INSTAGRAM_URL,
        }
    }

    pub fn identity_kind(self) -> IdentityKind {
        match self {
            BrowserChannel::WhatsApp => IdentityKind::Phone,
            BrowserChannel::Instagram => IdentityKind::Handle,
        }
    }

    pub fn delivered_label(self) -> &'static str {
        match self {
            BrowserChannel::WhatsApp => "Messages sent",
            BrowserChannel::Instagram => "DMs sent",
        }
    }
}

/// Opciones de una corrida con navegador
#[derive(Debug, Clone)]
pub struct ShardedRun {
    pub channel: BrowserChannel,
    pub browser: BrowserSettings,
    pub cooldown: Duration,
    pub prune_after_send: bool,
    pub quiet: bool,
}

/// Trozos contiguos; los primeros `len % shards` reciben un elemento extra
pub fn partition<T>(items: Vec<T>, shards: usize) -> Vec<Vec<T>> {
    if shards == 0 {
        return Vec::new();
    }
    let base = items.len() / shards;
    let extra = items.len() % shards;
    let mut iter = items.into_iter();
    (0..shards)
        .map(|i| {
            let size = base + usize::from(i < extra);
            iter.by_ref().take(size).collect()
        })
        .collect()
}

struct ShardJob {
    index: usize,
    run: ShardedRun,
    profile: BrowserProfile,
    source: Arc<dyn TargetSource>,
    targets: Vec<Target>,
    ledger: SharedLedger,
    progress: ProgressBar,
}

pub async fn run_sharded(
    run: ShardedRun,
    source: Arc<dyn TargetSource>,
    ledger: SharedLedger,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let profiles = run.browser.profiles.clone();
    if profiles.is_empty() {
        log::error!("(run_sharded) No hay perfiles de navegador configurados");
        summary.add_error("config", "No browser profiles configured (CHROME_PROFILES)");
        return Ok(summary);
    }

    let targets = match source.list_targets().await {
        Ok(targets) => targets,
        Err(e) => {
            log::error!(
                "(run_sharded) Error leyendo destinatarios de '{}': {}",
                source.name(),
                e
            );
            summary.add_error(source.name(), e);
            return Ok(summary);
        }
    };
    log::info!(
        "(run_sharded) {} destinatarios, {} perfiles, {} ya contactados",
        targets.len(),
        profiles.len(),
        ledger.len()
    );

    let multi = MultiProgress::new();
    if run.quiet {
        multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let style = ProgressStyle::with_template("{prefix:>12} [{bar:30}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let mut handles = Vec::new();
    for (index, (profile, shard)) in profiles
        .into_iter()
        .zip(partition(targets, run.browser.profiles.len()))
        .enumerate()
    {
        if shard.is_empty() {
            log::info!("(run_sharded) Perfil {} sin trabajo, no se abre", profile.profile_dir);
            continue;
        }
        let progress = multi.add(ProgressBar::new(shard.len() as u64));
        progress.set_style(style.clone());
        progress.set_prefix(profile.profile_dir.clone());

        let job = ShardJob {
            index,
            run: run.clone(),
            profile,
            source: source.clone(),
            targets: shard,
            ledger: ledger.clone(),
            progress,
        };
        handles.push(tokio::spawn(run_shard(job)));
    }

    let mut delivered = Vec::new();
    for joined in join_all(handles).await {
        match joined {
            Ok(Ok(report)) => {
                delivered.extend(delivered_identities(&report, run.channel.identity_kind()));
                summary.add_report(&report);
            }
            Ok(Err(e)) => {
                log::error!("(run_sharded) Shard terminó con error: {}", e);
                summary.add_error("shard", e);
            }
            Err(e) => {
                log::error!("(run_sharded) Tarea de shard abortada: {}", e);
                summary.add_error("shard", e);
            }
        }
    }

    if run.prune_after_send && !delivered.is_empty() {
        match source.prune_delivered(&delivered).await {
            Ok(removed) => log::info!("(run_sharded) {} filas quitadas de la fuente", removed),
            Err(e) => log::warn!("(run_sharded) No se pudo limpiar la fuente: {}", e),
        }
    }
    Ok(summary)
}

/// Identidades normalizadas que quedaron en SENT; sólo éstas se quitan de la fuente
pub fn delivered_identities(report: &RunReport, kind: IdentityKind) -> Vec<String> {
    report
        .records
        .iter()
        .filter(|r| r.outcome.is_sent())
        .filter_map(|r| kind.normalize(&r.identity).ok())
        .collect()
}

async fn run_shard(mut job: ShardJob) -> OutreachResult<RunReport> {
    let label = format!("Profile: {}", job.profile.profile_dir);
    log::info!(
        "(run_shard) [{}] shard {} con {} destinatarios",
        label,
        job.index,
        job.targets.len()
    );

    let session = BrowserSession::launch(&job.run.browser, &job.profile).await?;
    let browser = session.browser()?;
    let configs = job.run.browser.channel_configs(job.run.channel.endpoint());
    let targets = std::mem::take(&mut job.targets);

    let report = match job.run.channel {
        BrowserChannel::WhatsApp => {
            let transport = WhatsAppTransport::new(browser, session.profile());
            transport.wait_for_login(job.run.browser.login_wait).await?;
            drive(&transport, &job, configs, targets, &label).await
        }
        BrowserChannel::Instagram => {
            let transport = InstagramTransport::new(browser, session.profile(), &job.run.browser);
            drive(&transport, &job, configs, targets, &label).await
        }
    };

    session.shutdown().await;
    Ok(report)
}

async fn drive<T: MessageTransport>(
    transport: &T,
    job: &ShardJob,
    configs: Vec<ChannelConfig>,
    targets: Vec<Target>,
    label: &str,
) -> RunReport {
    BatchDriver::new(transport, job.ledger.clone(), configs, job.run.cooldown)
        .with_label(label)
        .with_progress(job.progress.clone())
        .run_targets(job.source.as_ref(), targets)
        .await
}
