//! JSON merge patch payloads written by the actuators

use crate::settings::IdlerSettings;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

/// Replica count the wake-up path restores to; never zero
pub fn unidle_replicas(current: i32) -> i32 {
    current.max(1)
}

/// `{"spec":{"replicas":0}}`
pub fn scale_to_zero() -> Value {
    json!({ "spec": { "replicas": 0 } })
}

/// Scale to zero and record what the wake-up path needs to restore the deployment
pub fn idle_deployment(settings: &IdlerSettings, current_replicas: i32, now: DateTime<Utc>) -> Value {
    json!({
        "spec": { "replicas": 0 },
        "metadata": {
            "labels": {
                settings.idling_key("watch"): "true",
            },
            "annotations": {
                settings.idling_key("idled-at"): now.to_rfc3339_opts(SecondsFormat::Secs, true),
                settings.idling_key("unidle-replicas"): unidle_replicas(current_replicas).to_string(),
                settings.idling_key("idled"): "true",
            },
        },
    })
}

/// Tell the ingress controller to hand 503s to the custom error backend
pub fn ingress_custom_errors(settings: &IdlerSettings) -> Value {
    json!({
        "metadata": {
            "annotations": {
                format!("{}/custom-http-errors", settings.ingress_annotation_prefix): "503",
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scale_to_zero_payload() {
        assert_eq!(scale_to_zero().to_string(), r#"{"spec":{"replicas":0}}"#);
    }

    #[test]
    fn test_unidle_replicas_never_zero() {
        assert_eq!(unidle_replicas(3), 3);
        assert_eq!(unidle_replicas(1), 1);
        assert_eq!(unidle_replicas(0), 1);
        assert_eq!(unidle_replicas(-1), 1);
    }

    #[test]
    fn test_idle_deployment_payload() {
        let settings = IdlerSettings::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let patch = idle_deployment(&settings, 3, now);

        assert_eq!(
            patch,
            json!({
                "spec": {"replicas": 0},
                "metadata": {
                    "labels": {"idling.amazee.io/watch": "true"},
                    "annotations": {
                        "idling.amazee.io/idled-at": "2024-05-01T12:30:00Z",
                        "idling.amazee.io/unidle-replicas": "3",
                        "idling.amazee.io/idled": "true"
                    }
                }
            })
        );
    }

    #[test]
    fn test_idle_deployment_payload_bytes() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            idle_deployment(&IdlerSettings::default(), 2, now).to_string(),
            concat!(
                r#"{"spec":{"replicas":0},"metadata":{"labels":{"idling.amazee.io/watch":"true"},"#,
                r#""annotations":{"idling.amazee.io/idled-at":"2024-05-01T12:30:00Z","#,
                r#""idling.amazee.io/unidle-replicas":"2","idling.amazee.io/idled":"true"}}}"#
            )
        );
    }

    #[test]
    fn test_idle_deployment_from_zero_records_one() {
        let patch = idle_deployment(&IdlerSettings::default(), 0, Utc::now());
        assert_eq!(patch["spec"]["replicas"], 0);
        assert_eq!(
            patch["metadata"]["annotations"]["idling.amazee.io/unidle-replicas"],
            "1"
        );
    }

    #[test]
    fn test_ingress_payload() {
        assert_eq!(
            ingress_custom_errors(&IdlerSettings::default()).to_string(),
            r#"{"metadata":{"annotations":{"nginx.ingress.kubernetes.io/custom-http-errors":"503"}}}"#
        );
    }
}
