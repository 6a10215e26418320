// self
use crate::obs::{CallKind, CallOutcome};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"restgate_call_total",
			"call" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Publishes the rate-budget gauge (`tokens / capacity`) via the global metrics recorder
/// (when enabled). An external observer can alert on this dropping below 0.2.
pub fn record_rate_saturation(ratio: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("restgate_rate_budget_ratio").set(ratio);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = ratio;
	}
}
