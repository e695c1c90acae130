//! Bot supervisor: turns one profile into running exchange loops.
//!
//! Each venue gets its own independent loop and its own strategy instance;
//! venues never share state. Recoverable venue errors are logged inside the
//! loops; only the shutdown flag ends them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use crate::config;
use crate::connector;
use crate::exchange::SpotExchange;
use crate::settings::Settings;
use crate::strategy::{self, Strategy};

pub struct Bot {
    bot_id: String,
    exchanges: Vec<(SpotExchange, Box<dyn Strategy>)>,
}

impl Bot {
    /// Load the profile and construct one exchange + strategy per venue.
    /// Unknown venue, unknown strategy or missing venue settings fail here,
    /// before anything runs.
    pub fn from_profile(
        bot_id: &str,
        profiles_path: &Path,
        venues_dir: &Path,
        settings: &Settings,
    ) -> anyhow::Result<Self> {
        let profile = config::load_bot_profile(profiles_path, bot_id)
            .with_context(|| format!("loading profile for bot {bot_id}"))?;

        let mut exchanges = Vec::with_capacity(profile.exchange_bases.len());
        for exchange_profile in &profile.exchange_bases {
            let venue_settings =
                config::load_venue_settings(venues_dir, &exchange_profile.exchange_name)
                    .with_context(|| {
                        format!("loading venue settings for {}", exchange_profile.exchange_name)
                    })?;
            let market_info = config::build_market_info(exchange_profile, &venue_settings)?;
            let connector = connector::build(&market_info.exchange, settings)?;
            let exchange = SpotExchange::new(market_info, connector, settings.clone());
            let strategy = strategy::build(&profile.strategy_file)?;
            info!(
                bot_id,
                exchange = %exchange.exchange_name(),
                strategy = strategy.name(),
                "exchange configured"
            );
            exchanges.push((exchange, strategy));
        }

        Ok(Self {
            bot_id: bot_id.to_string(),
            exchanges,
        })
    }

    /// One flag per exchange; the signal handler flips them all.
    pub fn shutdown_handles(&self) -> Vec<Arc<AtomicBool>> {
        self.exchanges
            .iter()
            .map(|(exchange, _)| exchange.shutdown_handle())
            .collect()
    }

    pub fn stop(&self) {
        for (exchange, _) in &self.exchanges {
            exchange.close();
        }
    }

    /// Drive every exchange loop to completion.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(bot_id = %self.bot_id, "start running bot");
        let mut tasks = Vec::new();
        for (mut exchange, mut strategy) in self.exchanges {
            tasks.push(tokio::spawn(async move {
                exchange.run(strategy.as_mut()).await;
            }));
        }
        for task in tasks {
            if let Err(err) = task.await {
                error!(bot_id = %self.bot_id, %err, "exchange task aborted");
            }
        }
        info!(bot_id = %self.bot_id, "bot finished");
        Ok(())
    }
}

/// Flip every handle false; shared by the ctrl-c task.
pub fn request_shutdown(handles: &[Arc<AtomicBool>]) {
    for handle in handles {
        handle.store(false, Ordering::SeqCst);
    }
}
