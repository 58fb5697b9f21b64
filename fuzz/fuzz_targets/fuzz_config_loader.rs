#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    let Ok(cfg) = windbal_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // A validated channel table must always map to a channel set.
        let set = windbal_core::ChannelSet::try_from(&cfg.channels);
        assert!(set.is_ok(), "validated config rejected: {set:?}");
    }
});
