//! Built-in plugin registration
//!
//! The explicit registration list: every adapter shipped with the
//! daemon, keyed by its dotted class name. Embedders can start from
//! this registry and add their own classes before building a pipeline.

use weir_consumers::{ConsoleConsumer, ProfilerConsumer, SocketConsumer};
use weir_plugin::TypeRegistry;
use weir_producers::{ConsoleProducer, FileProducer, NullProducer, SocketProducer};
use weir_transforms::{
    AllFilter, EnvelopeFormatter, ForwardFormatter, RateFilter, RegExpFilter, SequenceFormatter,
    TimestampFormatter,
};

/// Registry holding every built-in plugin class
pub fn builtin_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();

    registry.register_consumer("consumer.Console", ConsoleConsumer::new);
    registry.register_consumer("consumer.Profiler", ProfilerConsumer::new);
    registry.register_consumer("consumer.Socket", SocketConsumer::new);

    registry.register_producer("producer.Console", ConsoleProducer::new);
    registry.register_producer("producer.File", FileProducer::new);
    registry.register_producer("producer.Null", NullProducer::new);
    registry.register_producer("producer.Socket", SocketProducer::new);

    registry.register_filter("filter.All", AllFilter::new);
    registry.register_filter("filter.Rate", RateFilter::new);
    registry.register_filter("filter.RegExp", RegExpFilter::new);

    registry.register_formatter("format.Envelope", EnvelopeFormatter::new);
    registry.register_formatter("format.Forward", ForwardFormatter::new);
    registry.register_formatter("format.Sequence", SequenceFormatter::new);
    registry.register_formatter("format.Timestamp", TimestampFormatter::new);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_registered() {
        let registry = builtin_registry();
        for class in [
            "consumer.Console",
            "consumer.Profiler",
            "consumer.Socket",
            "producer.Console",
            "producer.File",
            "producer.Null",
            "producer.Socket",
            "filter.All",
            "filter.Rate",
            "filter.RegExp",
            "format.Envelope",
            "format.Forward",
            "format.Sequence",
            "format.Timestamp",
        ] {
            assert!(registry.contains(class), "missing {class}");
        }
    }

    #[test]
    fn test_rebuilding_registry_is_idempotent() {
        // Two builds must not interfere; registration into a fresh
        // registry always succeeds, re-registration is a no-op.
        let mut registry = builtin_registry();
        assert!(!registry.register_consumer("consumer.Console", ConsoleConsumer::new));
        assert_eq!(registry.len(), builtin_registry().len());
    }
}
