// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tip_ledger::http::{AppState, router};
use tip_ledger::{
    ChapaClient, GatewayConfig, Ledger, PayoutEngine, Settings, SystemClock, TipEngine,
    TransferEngine,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tip Ledger - creator tipping backend
///
/// Serves the tipping, payout and transfer API over HTTP, confirming tips
/// through Chapa checkouts and signed webhooks.
#[derive(Parser, Debug)]
#[command(name = "tip-ledger")]
#[command(about = "Ledger engine for a creator tipping platform", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "TIP_LEDGER_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Chapa API base URL
    #[arg(long, env = "CHAPA_BASE_URL", default_value = "https://api.chapa.co/v1")]
    chapa_base_url: String,

    /// Chapa secret API key (bearer token)
    #[arg(long, env = "CHAPA_SECRET_KEY", default_value = "", hide_env_values = true)]
    chapa_secret_key: String,

    /// Shared secret for webhook signatures; without it every webhook is rejected
    #[arg(long, env = "CHAPA_WEBHOOK_SECRET", hide_env_values = true)]
    chapa_webhook_secret: Option<String>,

    /// URL Chapa calls back after payment
    #[arg(long, env = "CHAPA_WEBHOOK_URL")]
    callback_url: Option<String>,

    /// URL the payer is sent back to after checkout
    #[arg(long, env = "CHAPA_RETURN_URL")]
    return_url: Option<String>,

    /// Timeout for every gateway request, in seconds
    #[arg(long, default_value_t = 10)]
    gateway_timeout_secs: u64,

    /// Currency stamped on new tips
    #[arg(long, default_value = "ETB")]
    currency: String,

    /// Provision an admin account with this name at startup
    #[arg(long, requires = "admin_email")]
    admin_name: Option<String>,

    /// Email of the admin provisioned at startup
    #[arg(long, requires = "admin_name")]
    admin_email: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut gateway = GatewayConfig::default()
            .with_base_url(&self.chapa_base_url)
            .with_secret_key(&self.chapa_secret_key)
            .with_timeout(Duration::from_secs(self.gateway_timeout_secs));
        gateway.callback_url = self.callback_url.clone();
        gateway.return_url = self.return_url.clone();

        Settings {
            currency: self.currency.clone(),
            gateway,
            webhook_secret: self.chapa_webhook_secret.clone(),
        }
    }
}

fn init_tracing(json: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("TIP_LEDGER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    let settings = args.settings();
    if settings.gateway.secret_key.is_empty() {
        warn!("no Chapa secret key configured; checkout initialization will fail");
    }

    let gateway = match ChapaClient::new(&settings.gateway) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to build gateway client");
            process::exit(1);
        }
    };

    let ledger = Arc::new(Ledger::new());
    if let (Some(name), Some(email)) = (&args.admin_name, &args.admin_email) {
        if let Err(e) = ledger.provision_admin(name, email) {
            error!(error = %e, "failed to provision admin");
            process::exit(1);
        }
    }

    let clock = Arc::new(SystemClock);
    let state = AppState {
        ledger: ledger.clone(),
        tips: Arc::new(TipEngine::new(
            ledger.clone(),
            gateway,
            settings,
            clock.clone(),
        )),
        payouts: Arc::new(PayoutEngine::new(ledger.clone(), clock.clone())),
        transfers: Arc::new(TransferEngine::new(ledger, clock)),
    };

    let listener = match tokio::net::TcpListener::bind(args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %args.bind, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(bind = %args.bind, "tip-ledger listening");

    if let Err(e) = axum::serve(listener, router(state)).await {
        error!(error = %e, "server error");
        process::exit(1);
    }
}
