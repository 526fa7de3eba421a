//! Subcommand definitions and handlers.

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::*;
use maple_splitter::{
    AccountId, Amount, AssetId, PayeeShare, ScopePolicy, SplitterConfig, SplitterEvent,
};
use serde::Serialize;
use tracing::debug;

use crate::home::{Home, Session};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum Command {
    /// Create a new splitter home with an initial roster
    Init {
        /// The splitter's own account on the rail
        #[arg(long, default_value = "splitter")]
        account: String,

        /// Roster entry as PAYEE:SHARES (repeatable)
        #[arg(long = "payee", value_parser = parse_payee, required = true)]
        payees: Vec<PayeeShare>,

        /// Account allowed to run administrative commands (repeatable)
        #[arg(long = "admin")]
        admins: Vec<String>,

        /// Reject checkpoint/reset when a funded token is left unlisted
        #[arg(long)]
        fail_closed: bool,

        /// Token always considered by the fail-closed check (repeatable)
        #[arg(long = "track")]
        tracked: Vec<String>,

        /// Start in the paused state
        #[arg(long)]
        paused: bool,

        /// Replace an existing home
        #[arg(long)]
        force: bool,
    },

    /// Credit value to the splitter's account on the simulated rail
    Deposit {
        /// `native` or `token:<contract>`
        #[arg(long, default_value = "native")]
        asset: AssetId,

        #[arg(long)]
        amount: Amount,

        /// Transfer fee the token charges, in basis points
        #[arg(long)]
        fee_bps: Option<u16>,
    },

    /// Pay a payee everything currently owed in one asset
    Release {
        #[arg(long, default_value = "native")]
        asset: AssetId,

        #[arg(long)]
        payee: String,
    },

    /// Freeze outstanding entitlement into credit, then replace the roster
    Checkpoint {
        #[arg(long)]
        caller: String,

        /// Token to checkpoint alongside the native asset (repeatable)
        #[arg(long = "token")]
        tokens: Vec<String>,

        /// New roster entry as PAYEE:SHARES (repeatable)
        #[arg(long = "payee", value_parser = parse_payee, required = true)]
        payees: Vec<PayeeShare>,
    },

    /// Replace the roster once everything owed has been claimed
    Reset {
        #[arg(long)]
        caller: String,

        /// Token that must be fully claimed (repeatable)
        #[arg(long = "token")]
        tokens: Vec<String>,

        /// New roster entry as PAYEE:SHARES (repeatable)
        #[arg(long = "payee", value_parser = parse_payee, required = true)]
        payees: Vec<PayeeShare>,
    },

    /// Halt releases and roster changes
    Pause {
        #[arg(long)]
        caller: String,
    },

    /// Resume normal operation
    Unpause {
        #[arg(long)]
        caller: String,
    },

    /// Show the roster and per-payee balances
    Status {
        /// Limit the report to one asset
        #[arg(long)]
        asset: Option<AssetId>,
    },

    /// Show the event journal
    Events {
        /// Only check the hash chain
        #[arg(long)]
        verify: bool,
    },
}

/// Parse a `PAYEE:SHARES` roster entry.
pub fn parse_payee(raw: &str) -> Result<PayeeShare, String> {
    let (payee, shares) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PAYEE:SHARES, got `{raw}`"))?;
    let shares = shares
        .trim()
        .parse()
        .map_err(|_| format!("invalid share count in `{raw}`"))?;
    Ok(PayeeShare {
        payee: AccountId::new(payee.trim()),
        shares,
    })
}

fn accounts(raw: Vec<String>) -> Vec<AccountId> {
    raw.into_iter().map(AccountId::new).collect()
}

pub fn execute(command: Command, home: &Home, format: OutputFormat) -> Result<()> {
    match command {
        Command::Init {
            account,
            payees,
            admins,
            fail_closed,
            tracked,
            paused,
            force,
        } => {
            let mut config = SplitterConfig::new(account, payees)
                .with_admins(accounts(admins))
                .with_tracked_tokens(accounts(tracked));
            if fail_closed {
                config = config.with_scope_policy(ScopePolicy::FailClosed);
            }
            if paused {
                config = config.paused();
            }
            let session = home.init(config, force)?;
            match format {
                OutputFormat::Json => {
                    output::print_json(&session.splitter.statements(&AssetId::Native)?)?
                }
                OutputFormat::Text => {
                    output::print_success(&format!(
                        "Initialized splitter home at {}",
                        home.root().display()
                    ));
                    print_roster(&session)?;
                }
            }
            Ok(())
        }

        Command::Deposit {
            asset,
            amount,
            fee_bps,
        } => {
            let session = home.open()?;
            if let Some(bps) = fee_bps {
                let token = asset
                    .token_contract()
                    .ok_or_else(|| anyhow!("--fee-bps only applies to tokens"))?;
                session.rail.set_transfer_fee_bps(token, bps)?;
            }
            session.rail.mint(&asset, session.splitter.account(), amount)?;
            home.save(&session)?;
            let held = session.splitter.held_balance(&asset)?;
            debug!(asset = %asset, amount, held, "Deposited");
            match format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "asset": asset,
                    "amount": amount.to_string(),
                    "held": held.to_string(),
                }))?,
                OutputFormat::Text => output::print_success(&format!(
                    "Deposited {amount} {asset} (held: {held})"
                )),
            }
            Ok(())
        }

        Command::Release { asset, payee } => {
            let session = home.open()?;
            let outcome = session.splitter.release(&asset, &AccountId::new(payee));
            // The rail may have moved value even when the release failed.
            home.save(&session)?;
            let receipt = outcome?;
            match format {
                OutputFormat::Json => output::print_json(&receipt)?,
                OutputFormat::Text => {
                    output::print_success(&format!(
                        "Released {} {} to {}",
                        receipt.delivered, receipt.asset, receipt.payee
                    ));
                    if receipt.credit > 0 {
                        output::print_field("credit", receipt.credit);
                    }
                    if receipt.delivered < receipt.requested {
                        output::print_warning(&format!(
                            "Requested {} but only {} arrived",
                            receipt.requested, receipt.delivered
                        ));
                    }
                }
            }
            Ok(())
        }

        Command::Checkpoint {
            caller,
            tokens,
            payees,
        } => {
            let session = home.open()?;
            let report = session.splitter.checkpoint_and_reset(
                &AccountId::new(caller),
                &accounts(tokens),
                &payees,
            )?;
            home.save(&session)?;
            match format {
                OutputFormat::Json => output::print_json(&report)?,
                OutputFormat::Text => {
                    output::print_success(&format!(
                        "Checkpointed {} asset(s), {} credit grant(s)",
                        report.assets.len(),
                        report.credits.len()
                    ));
                    for grant in &report.credits {
                        output::print_field(
                            grant.payee.as_str(),
                            format!("{} {}", grant.amount, grant.asset),
                        );
                    }
                    print_roster(&session)?;
                }
            }
            Ok(())
        }

        Command::Reset {
            caller,
            tokens,
            payees,
        } => {
            let session = home.open()?;
            let removed =
                session
                    .splitter
                    .reset_payees(&AccountId::new(caller), &accounts(tokens), &payees)?;
            home.save(&session)?;
            match format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "removed": removed,
                    "roster": payees,
                }))?,
                OutputFormat::Text => {
                    output::print_success(&format!("Replaced {} payee(s)", removed.len()));
                    print_roster(&session)?;
                }
            }
            Ok(())
        }

        Command::Pause { caller } => {
            let session = home.open()?;
            session.splitter.pause(&AccountId::new(caller))?;
            home.save(&session)?;
            match format {
                OutputFormat::Json => {
                    output::print_json(&serde_json::json!({ "paused": true }))?
                }
                OutputFormat::Text => output::print_success("Splitter paused"),
            }
            Ok(())
        }

        Command::Unpause { caller } => {
            let session = home.open()?;
            session.splitter.unpause(&AccountId::new(caller))?;
            home.save(&session)?;
            match format {
                OutputFormat::Json => {
                    output::print_json(&serde_json::json!({ "paused": false }))?
                }
                OutputFormat::Text => output::print_success("Splitter unpaused"),
            }
            Ok(())
        }

        Command::Status { asset } => {
            let session = home.open()?;
            let assets = match asset {
                Some(asset) => vec![asset],
                None => session.splitter.known_assets()?,
            };
            let reports = assets
                .into_iter()
                .map(|asset| asset_report(&session, asset))
                .collect::<Result<Vec<_>>>()?;
            match format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "account": session.splitter.account(),
                    "paused": session.splitter.is_paused()?,
                    "total_shares": session.splitter.total_shares()?,
                    "assets": reports,
                }))?,
                OutputFormat::Text => print_status(&session, &reports)?,
            }
            Ok(())
        }

        Command::Events { verify } => {
            let session = home.open()?;
            let intact = session.splitter.verify_journal()?;
            if verify {
                if !intact {
                    return Err(anyhow!("event journal hash chain is broken"));
                }
                output::print_success("Event journal hash chain verified");
                return Ok(());
            }
            let entries = session.splitter.journal_entries()?;
            match format {
                OutputFormat::Json => output::print_json(&entries)?,
                OutputFormat::Text => {
                    if entries.is_empty() {
                        println!("{}", "No events".dimmed());
                    }
                    for entry in &entries {
                        println!(
                            "{:>4}  {}  {:<16} {}",
                            entry.index,
                            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.event.kind().cyan(),
                            describe(&entry.event)
                        );
                    }
                    if !intact {
                        output::print_warning("Event journal hash chain is broken");
                    }
                }
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct PayeeLine {
    payee: AccountId,
    shares: u64,
    released: String,
    credit: String,
    releasable: String,
}

#[derive(Serialize)]
struct AssetReport {
    asset: AssetId,
    held: String,
    total_received: String,
    total_released: String,
    payees: Vec<PayeeLine>,
}

fn asset_report(session: &Session, asset: AssetId) -> Result<AssetReport> {
    let splitter = &session.splitter;
    let payees = splitter
        .statements(&asset)
        .with_context(|| format!("statements for {asset}"))?
        .into_iter()
        .map(|line| PayeeLine {
            payee: line.payee,
            shares: line.shares,
            released: line.released.to_string(),
            credit: line.credit.to_string(),
            releasable: line.releasable.to_string(),
        })
        .collect();
    Ok(AssetReport {
        held: splitter.held_balance(&asset)?.to_string(),
        total_received: splitter.total_received(&asset)?.to_string(),
        total_released: splitter.total_released(&asset)?.to_string(),
        asset,
        payees,
    })
}

fn print_roster(session: &Session) -> Result<()> {
    let splitter = &session.splitter;
    let total = splitter.total_shares()?;
    for payee in splitter.payees()? {
        let shares = splitter.shares(&payee)?;
        output::print_field(payee.as_str(), format!("{shares}/{total} shares"));
    }
    Ok(())
}

fn print_status(session: &Session, reports: &[AssetReport]) -> Result<()> {
    let splitter = &session.splitter;
    let state = if splitter.is_paused()? {
        "paused".yellow()
    } else {
        "active".green()
    };
    println!("{} {} ({})", "Splitter".bold(), splitter.account(), state);
    print_roster(session)?;

    for report in reports {
        println!();
        println!(
            "{}  held {}  received {}  released {}",
            report.asset.to_string().bold(),
            report.held,
            report.total_received,
            report.total_released
        );
        for line in &report.payees {
            println!(
                "  {:<16} shares {:<6} released {:<12} credit {:<10} releasable {}",
                line.payee.as_str(),
                line.shares,
                line.released,
                line.credit,
                line.releasable
            );
        }
    }
    Ok(())
}

fn describe(event: &SplitterEvent) -> String {
    match event {
        SplitterEvent::PayeeAdded { payee, shares } => format!("{payee} with {shares} shares"),
        SplitterEvent::PaymentReleased {
            asset,
            payee,
            amount,
        } => format!("{amount} {asset} to {payee}"),
        SplitterEvent::Checkpointed {
            previous_roster,
            assets,
            credits,
        } => format!(
            "{} payee(s) over {} asset(s), {} credit grant(s)",
            previous_roster.len(),
            assets.len(),
            credits.len()
        ),
        SplitterEvent::RosterReset {
            roster,
            checkpointed,
        } => {
            let mode = if *checkpointed { "after checkpoint" } else { "direct" };
            format!("{} payee(s), {mode}", roster.len())
        }
        SplitterEvent::Paused { by } => format!("by {by}"),
        SplitterEvent::Unpaused { by } => format!("by {by}"),
        SplitterEvent::VaultRedeemed {
            vault,
            asset,
            shares,
            received,
        } => format!("{shares} share(s) of {vault} for {received} {asset}"),
    }
}
