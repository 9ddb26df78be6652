use clap::{Parser, Subcommand};
use retryable_chain::config::Config;
use retryable_chain::dispatch::{self, Call, Output, Receipt};
use retryable_chain::error::{Error, Result};
use retryable_chain::event::{Event, EventLog};
use retryable_chain::gas::GasLedger;
use retryable_chain::logger::{Level, Logger};
use retryable_chain::retryable::CallContext;
use retryable_chain::storage::{FileStorage, Storage};
use retryable_chain::ticket::{MemoryTicketStore, Ticket, RETRYABLE_LIFETIME_SECONDS};
use retryable_chain::types::{Address, TicketId};
use retryable_chain::{current_timestamp, sha256_digest};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "retryable-chain")]
#[command(about = "Retryable ticket controller - cancel, keep alive and redeem retryable tickets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: "human" or "json"
    #[arg(short, long)]
    pub format: Option<String>,

    /// Data directory path
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Gas available to the call
    #[arg(short, long)]
    pub gas: Option<u64>,

    /// Block timestamp to execute at (defaults to wall clock)
    #[arg(long)]
    pub now: Option<u64>,

    /// Caller address (0x-prefixed hex)
    #[arg(short, long)]
    pub caller: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the data directory
    Init,

    /// Insert a new ticket (outer-layer creation, emits TicketCreated)
    Create {
        /// Beneficiary allowed to cancel
        #[arg(long)]
        beneficiary: String,

        /// Destination of the retried call
        #[arg(long)]
        to: String,

        /// Call value carried by the ticket
        #[arg(long, default_value_t = 0)]
        value: u128,

        /// Calldata as hex
        #[arg(long, default_value = "")]
        calldata: String,

        /// Explicit ticket id (derived from caller, time and store size if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Cancel a ticket (beneficiary only)
    Cancel { ticket_id: String },

    /// Reset a ticket's expiry to now + lifetime
    Keepalive { ticket_id: String },

    /// Schedule a redeem attempt, donating remaining gas
    Redeem { ticket_id: String },

    /// Retire a ticket after its scheduled retry succeeded
    Complete { ticket_id: String },

    /// Show a ticket's beneficiary
    Beneficiary { ticket_id: String },

    /// Show a ticket's timeout
    Timeout { ticket_id: String },

    /// Show the protocol ticket lifetime
    Lifetime,

    /// List committed events
    Events {
        /// Only show events for this ticket
        #[arg(long)]
        ticket: Option<String>,
    },
}

/// Load the persisted ticket store or start empty
pub fn load_or_create_store(storage: &FileStorage) -> Result<MemoryTicketStore> {
    Ok(storage.load_store()?.unwrap_or_default())
}

fn parse_ticket_id(s: &str) -> Result<TicketId> {
    s.parse()
}

/// Format output based on format type
fn format_output<T: serde::Serialize + std::fmt::Debug>(data: &T, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(data)
            .map_err(|e| Error::StateError(format!("Failed to serialize JSON: {}", e))),
        _ => Ok(format!("{:#?}", data)),
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.set_data_dir(PathBuf::from(dir));
    }
    if let Some(format) = cli.format {
        config.set_output_format(format);
    }
    if let Some(gas) = cli.gas {
        config.set_gas_limit(gas);
    }
    Logger::set_level(Level::parse(config.get_log_level()));

    let caller = match cli.caller.as_deref() {
        Some(s) => s.parse::<Address>()?,
        None => Address::ZERO,
    };
    let ctx = CallContext::new(caller, cli.now.unwrap_or_else(current_timestamp));
    let format = config.get_output_format().to_string();
    let mut storage = FileStorage::new(&config);

    let call = match cli.command {
        Commands::Init => {
            fs::create_dir_all(config.get_data_dir()).map_err(|e| {
                Error::StateError(format!("Failed to create data directory: {}", e))
            })?;
            println!("Initialized data directory at: {}", config.get_data_dir().display());
            return Ok(());
        }

        Commands::Create {
            beneficiary,
            to,
            value,
            calldata,
            id,
        } => {
            let mut store = load_or_create_store(&storage)?;
            let ticket_id = match id {
                Some(id) => parse_ticket_id(&id)?,
                None => derive_ticket_id(&ctx, store.len()),
            };
            let calldata = hex::decode(calldata.trim_start_matches("0x"))
                .map_err(|e| Error::InvalidInput(format!("Invalid calldata hex: {}", e)))?;
            let timeout = ctx
                .now
                .checked_add(RETRYABLE_LIFETIME_SECONDS)
                .ok_or_else(|| Error::InvalidInput("timestamp overflows".to_string()))?;
            let ticket = Ticket::new(
                ticket_id,
                caller,
                to.parse()?,
                value,
                beneficiary.parse()?,
                calldata,
                timeout,
            );

            let mut sink = EventLog::new();
            dispatch::create_ticket(&mut store, &mut sink, ticket)?;
            storage.commit(&store, sink.events())?;

            let output = TicketOutput::from_store(&store, &ticket_id)?;
            println!("{}", format_output(&output, &format)?);
            return Ok(());
        }

        Commands::Complete { ticket_id } => {
            let ticket_id = parse_ticket_id(&ticket_id)?;
            let mut store = load_or_create_store(&storage)?;
            let mut sink = EventLog::new();
            dispatch::complete_redeem(&mut store, &mut sink, &ticket_id, ctx.now)?;
            storage.commit(&store, sink.events())?;
            println!("✓ Ticket {} redeemed", ticket_id);
            return Ok(());
        }

        Commands::Events { ticket } => {
            let ticket = ticket.as_deref().map(parse_ticket_id).transpose()?;
            let events: Vec<EventOutput> = storage
                .load_events()?
                .iter()
                .filter(|e| ticket.map_or(true, |id| *e.ticket_id() == id))
                .map(EventOutput::from)
                .collect();
            println!("{}", format_output(&events, &format)?);
            return Ok(());
        }

        Commands::Cancel { ticket_id } => Call::Cancel {
            ticket_id: parse_ticket_id(&ticket_id)?,
        },
        Commands::Keepalive { ticket_id } => Call::Keepalive {
            ticket_id: parse_ticket_id(&ticket_id)?,
        },
        Commands::Redeem { ticket_id } => Call::Redeem {
            ticket_id: parse_ticket_id(&ticket_id)?,
        },
        Commands::Beneficiary { ticket_id } => Call::GetBeneficiary {
            ticket_id: parse_ticket_id(&ticket_id)?,
        },
        Commands::Timeout { ticket_id } => Call::GetTimeout {
            ticket_id: parse_ticket_id(&ticket_id)?,
        },
        Commands::Lifetime => Call::GetLifetime,
    };

    let mut store = load_or_create_store(&storage)?;
    let mut sink = EventLog::new();
    let mut gas = GasLedger::new(config.get_gas_limit());
    let receipt = dispatch::execute(&mut store, &mut sink, &call, &ctx, &mut gas);

    if receipt.is_success() && !call.is_read_only() {
        storage.commit(&store, sink.events())?;
    }

    let output = ReceiptOutput::new(&receipt, gas.remaining());
    println!("{}", format_output(&output, &format)?);
    receipt.into_result().map(|_| ())
}

/// Ticket id for CLI-created tickets: SHA-256 of caller, timestamp and store size.
fn derive_ticket_id(ctx: &CallContext, store_len: usize) -> TicketId {
    let mut data = Vec::with_capacity(20 + 16);
    data.extend_from_slice(ctx.caller.as_bytes());
    data.extend_from_slice(&ctx.now.to_be_bytes());
    data.extend_from_slice(&(store_len as u64).to_be_bytes());
    TicketId(sha256_digest(&data))
}

fn render_output(output: &Output) -> String {
    match output {
        Output::Unit => String::new(),
        Output::Address(addr) => addr.to_string(),
        Output::Timestamp(t) => t.to_string(),
        Output::TicketId(id) => id.to_string(),
    }
}

#[derive(Debug, serde::Serialize)]
struct ReceiptOutput {
    success: bool,
    output: String,
    return_word: String,
    gas_used: u64,
    gas_remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReceiptOutput {
    fn new(receipt: &Receipt, gas_remaining: u64) -> Self {
        ReceiptOutput {
            success: receipt.is_success(),
            output: render_output(&receipt.output),
            return_word: format!("0x{}", hex::encode(receipt.output.encode_word())),
            gas_used: receipt.gas_used,
            gas_remaining,
            error: receipt.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct TicketOutput {
    ticket_id: String,
    from: String,
    to: String,
    call_value: String,
    beneficiary: String,
    calldata: String,
    timeout: u64,
    num_tries: u64,
    size_bytes: u64,
}

impl TicketOutput {
    fn from_store(store: &MemoryTicketStore, ticket_id: &TicketId) -> Result<Self> {
        let t = store.get(ticket_id).ok_or(Error::NotFound)?;
        Ok(TicketOutput {
            ticket_id: t.id.to_string(),
            from: t.from.to_string(),
            to: t.to.to_string(),
            call_value: t.call_value.to_string(),
            beneficiary: t.beneficiary.to_string(),
            calldata: format!("0x{}", hex::encode(&t.calldata)),
            timeout: t.timeout,
            num_tries: t.num_tries,
            size_bytes: t.size_bytes(),
        })
    }
}

#[derive(Debug, serde::Serialize)]
struct EventOutput {
    kind: String,
    ticket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_num: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    donated_gas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_donor: Option<String>,
}

impl From<&Event> for EventOutput {
    fn from(event: &Event) -> Self {
        let mut output = EventOutput {
            kind: format!("{:?}", event.kind()),
            ticket_id: event.ticket_id().to_string(),
            new_timeout: None,
            retry_tx_id: None,
            sequence_num: None,
            donated_gas: None,
            gas_donor: None,
        };
        match event {
            Event::LifetimeExtended { new_timeout, .. } => {
                output.new_timeout = Some(*new_timeout);
            }
            Event::RedeemScheduled {
                retry_tx_id,
                sequence_num,
                donated_gas,
                gas_donor,
                ..
            } => {
                output.retry_tx_id = Some(retry_tx_id.to_string());
                output.sequence_num = Some(*sequence_num);
                output.donated_gas = Some(*donated_gas);
                output.gas_donor = Some(gas_donor.to_string());
            }
            Event::TicketCreated { .. } | Event::Redeemed { .. } | Event::Canceled { .. } => {}
        }
        output
    }
}
