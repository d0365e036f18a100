#[macro_export]
macro_rules! payload_sent_metrics {
    ($command:expr) => {{
        metrics::counter!("payload_sent", "command" => $command.to_string()).increment(1);
    }};
}

#[macro_export]
macro_rules! payload_received_metrics {
    ($command:expr) => {{
        metrics::counter!("payload_received", "command" => $command.to_string()).increment(1);
    }};
}

#[macro_export]
macro_rules! payload_dropped_metrics {
    ($reason:expr) => {{
        metrics::counter!("payload_dropped", "reason" => $reason.to_string()).increment(1);
    }};
}

#[macro_export]
macro_rules! signing_outcome_metrics {
    ($outcome:expr, $started:expr) => {{
        metrics::counter!("signing_sessions_total", "outcome" => $outcome.to_string()).increment(1);
        metrics::histogram!("signing_session_seconds", "outcome" => $outcome.to_string())
            .record($started.elapsed().as_secs_f64());
    }};
}

#[macro_export]
macro_rules! open_sessions_metrics {
    ($role:expr, $count:expr) => {{
        metrics::gauge!("open_sessions", "role" => $role.to_string()).set($count as f64);
    }};
}
