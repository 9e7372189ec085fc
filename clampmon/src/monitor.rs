use std::sync::mpsc::Receiver;
use std::time::Duration;

use log::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::link::{interrupted, Link, LinkState, SystemLink, WifiSession};
use crate::reporter::{CurlClient, HttpClient, Reporter};

/// Bring the link up, then report once per `period` until told to stop on `term_receiver`
pub fn monitor_loop<L: Link, C: HttpClient>(
    session: &mut WifiSession<L>,
    reporter: &mut Reporter<C>,
    settle: Duration,
    period: Duration,
    term_receiver: &Receiver<()>,
) -> Result<()> {
    if session.connect(term_receiver)? == LinkState::Stopped
        || interrupted(term_receiver, settle)
    {
        info!("Exiting before first report");
        return Ok(());
    }

    let mut sent: u64 = 0;
    let mut delivered: u64 = 0;
    loop {
        let outcome = reporter.cycle(&*session);
        debug!("Report outcome: {outcome:?}");
        sent += 1;
        if outcome.is_delivered() {
            delivered += 1;
        }

        if interrupted(term_receiver, period) {
            break;
        }
    }

    info!("Exiting, {delivered} of {sent} reports delivered");
    Ok(())
}

/// Run the reporter described by `config` on this host's wifi interface
pub fn run(config: &Config, term_receiver: &Receiver<()>) -> Result<()> {
    let status = config.initial_status()?;
    let report_url = config.report_url()?;
    info!("Clamp: {status}");

    let mut session = WifiSession::new(
        SystemLink,
        config.credentials(),
        config.retry_policy(),
    );
    let mut reporter = Reporter::new(
        status,
        report_url,
        CurlClient::new(config.timeout_duration()),
    );
    info!(
        "Reporting to: {} every {:?}",
        reporter.report_url(),
        config.period_duration()
    );

    monitor_loop(
        &mut session,
        &mut reporter,
        config.settle_duration(),
        config.period_duration(),
        term_receiver,
    )
}
