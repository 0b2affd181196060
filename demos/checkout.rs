//! Walk-through of one payment negotiation.
//!
//! Fetches a payment session, prepares it, starts a Swish attempt, and
//! prints the prioritized next operations after every step.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example checkout -- https://api.example.com/psp/paymentsessions/abc123
//! ```

use paylink_rs::{
    PaymentAttemptInstrument, PaymentOutputModel, PaymentSession, RouterConfig, TelemetrySink,
};

fn print_affordances(step: &str, output: Option<&PaymentOutputModel>) {
    match output {
        Some(model) => {
            let rels: Vec<&str> = model
                .prioritised_operations()
                .iter()
                .map(|op| op.rel.as_str())
                .collect();
            println!("{}: server offers {:?}", step, rels);
            if let Some(problem) = &model.problem {
                println!("{}: problem reported: {}", step, problem);
            }
        }
        None => println!("{}: no payload returned", step),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let session_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://api.example.com/psp/paymentsessions/demo".to_string());
    println!("negotiating against {}", session_url);

    let config = RouterConfig::default().with_locale("sv-SE");
    let mut session = PaymentSession::new(config, TelemetrySink::disabled(), session_url);

    let output = session.fetch().await?;
    print_affordances("fetch", output.as_ref());

    let output = session.prepare_payment().await?;
    print_affordances("prepare", output.as_ref());

    let instrument = PaymentAttemptInstrument::Swish { msisdn: None };
    match session.begin_payment_attempt(&instrument, "sv-SE").await {
        Ok(output) => print_affordances("attempt", output.as_ref()),
        Err(err) => println!("attempt failed: {} ({})", err, err.user_message()),
    }

    Ok(())
}
