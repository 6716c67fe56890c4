//! Script runner: `venue <config.json> <script.jsonl>`
//!
//! Each script line is one JSON command, e.g.
//! `{"op":"submit","account":"alice","market":"ETH-GAS-2026Q4","side":"BUY","price":"0.40","quantity":"5"}`.
//! Every command prints one JSON result line; rejections are results, not
//! failures. Accounts and orders are referred to by script labels.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use types::ids::{AccountId, MarketId, OrderId};
use types::numeric::{Amount, Price, Quantity};
use types::order::{OrderType, Side, TimeInForce};
use venue::{AcceptAll, OrderRequest, Venue, VenueConfig};

fn default_depth() -> usize {
    10
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Deposit {
        account: String,
        asset: String,
        /// Native units
        amount: u64,
    },
    Withdraw {
        account: String,
        asset: String,
        amount: u64,
    },
    Submit {
        account: String,
        /// Name to cancel the order by
        #[serde(default)]
        label: Option<String>,
        market: MarketId,
        side: Side,
        #[serde(default = "default_order_type")]
        order_type: OrderType,
        quantity: Quantity,
        #[serde(default)]
        price: Option<Price>,
        #[serde(default)]
        time_in_force: Option<TimeInForce>,
        #[serde(default)]
        stop_price: Option<Price>,
        #[serde(default)]
        iceberg_quantity: Option<Quantity>,
        #[serde(default)]
        post_only: bool,
        /// Next sequence for the account when absent
        #[serde(default)]
        sequence_number: Option<u64>,
    },
    Cancel {
        account: String,
        order: String,
    },
    Expire {
        at: i64,
    },
    Flush,
    Close {
        market: MarketId,
    },
    Resolve {
        market: MarketId,
        outcome: Price,
    },
    MarketData {
        market: MarketId,
        #[serde(default = "default_depth")]
        depth: usize,
    },
    Position {
        account: String,
        market: MarketId,
    },
    Balances {
        asset: String,
    },
    DeadLetters,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Deposit { .. } => "deposit",
            Command::Withdraw { .. } => "withdraw",
            Command::Submit { .. } => "submit",
            Command::Cancel { .. } => "cancel",
            Command::Expire { .. } => "expire",
            Command::Flush => "flush",
            Command::Close { .. } => "close",
            Command::Resolve { .. } => "resolve",
            Command::MarketData { .. } => "market_data",
            Command::Position { .. } => "position",
            Command::Balances { .. } => "balances",
            Command::DeadLetters => "dead_letters",
        }
    }
}

struct Runner<'a> {
    venue: &'a Venue,
    accounts: BTreeMap<String, AccountId>,
    sequences: HashMap<AccountId, u64>,
    orders: HashMap<String, (MarketId, OrderId)>,
    assets: BTreeSet<String>,
}

impl<'a> Runner<'a> {
    fn new(venue: &'a Venue) -> Self {
        Self {
            venue,
            accounts: BTreeMap::new(),
            sequences: HashMap::new(),
            orders: HashMap::new(),
            assets: BTreeSet::new(),
        }
    }

    fn account(&mut self, label: &str) -> AccountId {
        *self.accounts.entry(label.to_string()).or_insert_with(AccountId::new)
    }

    async fn run(&mut self, command: Command) -> Value {
        let op = command.name();
        match self.execute(command).await {
            Ok(result) => json!({ "op": op, "ok": result }),
            Err(err) => json!({ "op": op, "error": err.to_string() }),
        }
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<Value> {
        let venue = self.venue;
        match command {
            Command::Deposit { account, asset, amount } => {
                let id = self.account(&account);
                venue.deposit(&id, &asset, Amount::new(amount.into()))?;
                self.assets.insert(asset.clone());
                Ok(serde_json::to_value(venue.balance(&id, &asset))?)
            }
            Command::Withdraw { account, asset, amount } => {
                let id = self.account(&account);
                venue.withdraw(&id, &asset, Amount::new(amount.into()))?;
                Ok(serde_json::to_value(venue.balance(&id, &asset))?)
            }
            Command::Submit {
                account,
                label,
                market,
                side,
                order_type,
                quantity,
                price,
                time_in_force,
                stop_price,
                iceberg_quantity,
                post_only,
                sequence_number,
            } => {
                let id = self.account(&account);
                let last = self.sequences.entry(id).or_insert(0);
                let sequence_number = sequence_number.unwrap_or(*last + 1);
                *last = (*last).max(sequence_number);

                let request = OrderRequest {
                    account_id: id,
                    market_id: market.clone(),
                    side,
                    order_type,
                    quantity,
                    price,
                    time_in_force,
                    stop_price,
                    iceberg_quantity,
                    post_only,
                    sequence_number,
                    signature: None,
                };
                let outcome = venue.submit(request).await?;
                if let Some(label) = label {
                    self.orders.insert(label, (market, outcome.order.order_id));
                }
                Ok(json!({ "order": outcome.order, "trades": outcome.trades }))
            }
            Command::Cancel { account, order } => {
                let id = self.account(&account);
                let (market, order_id) = self
                    .orders
                    .get(&order)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown order label {}", order))?;
                Ok(serde_json::to_value(venue.cancel(&market, order_id, id).await?)?)
            }
            Command::Expire { at } => Ok(serde_json::to_value(venue.expire(at).await?)?),
            Command::Flush => Ok(serde_json::to_value(venue.flush().await)?),
            Command::Close { market } => Ok(serde_json::to_value(venue.close_market(&market).await?)?),
            Command::Resolve { market, outcome } => {
                Ok(serde_json::to_value(venue.resolve_market(&market, outcome).await?)?)
            }
            Command::MarketData { market, depth } => {
                Ok(serde_json::to_value(venue.market_data(&market, depth).await?)?)
            }
            Command::Position { account, market } => {
                let id = self.account(&account);
                Ok(serde_json::to_value(venue.position(&market, &id))?)
            }
            Command::Balances { asset } => Ok(self.balances(&asset)),
            Command::DeadLetters => Ok(serde_json::to_value(venue.bridge().dead_letters())?),
        }
    }

    fn balances(&self, asset: &str) -> Value {
        let rows: serde_json::Map<String, Value> = self
            .accounts
            .iter()
            .map(|(label, id)| {
                let balance = self.venue.balance(id, asset);
                (
                    label.clone(),
                    json!({
                        "available": balance.available,
                        "reserved": balance.reserved,
                        "in_flight": balance.in_flight,
                    }),
                )
            })
            .collect();
        Value::Object(rows)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(script_path)) = (args.next(), args.next()) else {
        bail!("usage: venue <config.json> <script.jsonl>");
    };

    let config = VenueConfig::load(Path::new(&config_path)).context("loading venue config")?;
    let script = std::fs::read_to_string(&script_path).with_context(|| format!("reading script {}", script_path))?;
    let venue = Venue::open(config, Arc::new(AcceptAll)).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let (assets, accounts) = {
        let mut runner = Runner::new(&venue);
        for (index, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let command: Command =
                serde_json::from_str(line).with_context(|| format!("parsing script line {}", index + 1))?;
            let record = runner.run(command).await;
            writeln!(out, "{}", record)?;
        }
        (runner.assets, runner.accounts)
    };

    let ledger = Arc::clone(venue.ledger());
    let settled = venue.shutdown().await;
    let balances: BTreeMap<String, BTreeMap<String, Value>> = assets
        .iter()
        .map(|asset| {
            let rows = accounts
                .iter()
                .map(|(label, id)| {
                    let balance = ledger.balance(id, asset);
                    (label.clone(), json!({ "available": balance.available, "reserved": balance.reserved }))
                })
                .collect();
            (asset.clone(), rows)
        })
        .collect();
    writeln!(
        out,
        "{}",
        json!({ "op": "summary", "ok": { "settled": settled, "balances": balances, "violations": ledger.verify_invariants().len() } })
    )?;
    Ok(())
}
