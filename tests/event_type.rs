#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use snax_datagen::{
        datagen_macros::event_type,
        logging::{
            initialize_log, log_event, registry::get_metrics_vec, take_log, JsonLinesLogger,
            LogFilter, LogProcessor,
        },
    };

    /// A downstream generator reporting its own progress.
    #[event_type]
    #[derive(Serialize, Deserialize, Debug, Clone)]
    struct KernelPatched {
        kernel: String,
        words: usize,
    }

    #[test]
    fn external_events_are_registered() {
        assert!(get_metrics_vec().contains(&"KernelPatched"));
        assert!(LogFilter::from_names("KernelPatched,ModeBuilt").is_ok());
    }

    #[test]
    fn external_events_pass_the_filter() {
        let filter = LogFilter::from_names("KernelPatched").unwrap();
        let (interface, mut processor) = JsonLinesLogger::new("downstream", Vec::new(), filter);
        initialize_log(interface);
        log_event(&KernelPatched {
            kernel: "gemm".to_string(),
            words: 12,
        })
        .unwrap();
        take_log();
        processor.process().unwrap();

        let log = String::from_utf8(processor.into_sink()).unwrap();
        let entry: serde_json::Value = serde_json::from_str(log.trim()).unwrap();
        assert_eq!(entry["event_type"], "KernelPatched");
        assert_eq!(entry["event_data"]["words"], 12);
    }
}
