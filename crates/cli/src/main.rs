//! Teller CLI - Main entry point

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use teller_bank::NewCustomer;
use teller_cli::commands::{self, FxOrder};
use teller_cli::AppContext;
use teller_core::{Actor, Currency};
use teller_ledger::{FxKind, Segment};
use teller_risk::RiskRating;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "teller")]
#[command(about = "Teller - branch banking core", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data", env = "TELLER_DATA")]
    data: PathBuf,

    /// User id recorded on every change
    #[arg(long, default_value = "SYSTEM", env = "TELLER_ACTOR")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and the default account types
    Init,

    /// Register a customer
    RegisterCustomer {
        national_id: String,
        first_name: String,
        last_name: String,
        #[arg(long, default_value = "001")]
        branch: String,
        /// retail, sme, high-value or young-professional
        #[arg(long, default_value = "retail")]
        segment: Segment,
        /// LOW, MEDIUM or HIGH
        #[arg(long, default_value = "LOW")]
        risk: RiskRating,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        pep: bool,
    },

    /// Open an account for a customer
    OpenAccount {
        customer: String,
        /// Account type code (SAV, CUR, ...)
        account_type: String,
        #[arg(default_value = "KES")]
        currency: Currency,
    },

    /// Approve and activate a PENDING account
    Activate { account: String },

    /// Deposit cash into an account
    Deposit {
        account: String,
        amount: Decimal,
        /// Client reference; a retry with the same one posts once
        #[arg(long)]
        reference: Option<String>,
    },

    /// Withdraw cash from an account
    Withdraw {
        account: String,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
    },

    /// Transfer between two accounts
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
    },

    /// Pay a registered biller
    PayBill {
        account: String,
        biller: String,
        /// Meter, account or invoice number at the biller
        bill_reference: String,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
    },

    /// List active billers
    Billers,

    /// Show an account balance
    Balance { account: String },

    /// List the entries of an account
    Statement { account: String },

    /// Check that entries sum to balances
    Verify {
        /// Only this account
        account: Option<String>,
    },

    /// Submit an FX deal
    Fx {
        /// BUY, SELL or TRANSFER
        kind: FxKind,
        /// Account debited in the base currency
        account: String,
        base: Currency,
        quote: Currency,
        /// Quote units per base unit
        rate: Decimal,
        amount: Decimal,
        /// Account credited in the quote currency
        #[arg(long)]
        counter: Option<String>,
        #[arg(long)]
        beneficiary: Option<String>,
    },

    /// List pending approval requests
    Requests,

    /// Approve a pending request
    Approve { request: String },

    /// Reject a pending request
    Reject {
        request: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Print outbox events as JSON lines
    Events {
        /// Only events after this sequence number
        #[arg(long, default_value = "0")]
        since: i64,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("TELLER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::open(&cli.data, Actor::new(cli.actor))?;

    match cli.command {
        Commands::Init => commands::init(&ctx)?,

        Commands::RegisterCustomer {
            national_id,
            first_name,
            last_name,
            branch,
            segment,
            risk,
            email,
            phone,
            pep,
        } => {
            let new = NewCustomer {
                branch_code: branch,
                national_id,
                first_name,
                last_name,
                email,
                phone,
                address: None,
                occupation: None,
                segment,
                risk_rating: risk,
                is_pep: pep,
            };
            commands::register_customer(&ctx, &new)?;
        }

        Commands::OpenAccount {
            customer,
            account_type,
            currency,
        } => commands::open_account(&ctx, &customer, &account_type, currency)?,

        Commands::Activate { account } => commands::activate(&ctx, &account)?,

        Commands::Deposit {
            account,
            amount,
            reference,
        } => commands::deposit(&ctx, &account, amount, reference.as_deref())?,

        Commands::Withdraw {
            account,
            amount,
            reference,
        } => commands::withdraw(&ctx, &account, amount, reference.as_deref())?,

        Commands::Transfer {
            from,
            to,
            amount,
            reference,
        } => commands::transfer(&ctx, &from, &to, amount, reference.as_deref())?,

        Commands::PayBill {
            account,
            biller,
            bill_reference,
            amount,
            reference,
        } => commands::pay_bill(&ctx, &account, &biller, &bill_reference, amount, reference.as_deref())?,

        Commands::Billers => commands::billers(&ctx)?,

        Commands::Balance { account } => commands::balance(&ctx, &account)?,

        Commands::Statement { account } => commands::statement(&ctx, &account)?,

        Commands::Verify { account } => commands::verify(&ctx, account.as_deref())?,

        Commands::Fx {
            kind,
            account,
            base,
            quote,
            rate,
            amount,
            counter,
            beneficiary,
        } => commands::fx(
            &ctx,
            FxOrder {
                kind,
                account_id: &account,
                counter_account_id: counter.as_deref(),
                base,
                quote,
                rate,
                amount,
                beneficiary: beneficiary.as_deref(),
            },
        )?,

        Commands::Requests => commands::requests(&ctx)?,

        Commands::Approve { request } => commands::approve(&ctx, &request)?,

        Commands::Reject { request, reason } => commands::reject(&ctx, &request, reason.as_deref())?,

        Commands::Events { since, limit } => commands::events(&ctx, since, limit)?,
    }

    Ok(())
}
