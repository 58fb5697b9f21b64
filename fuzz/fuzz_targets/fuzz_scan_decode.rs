#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, &str)| {
    let (channels, response) = input;
    let channels = usize::from(channels % 32);
    if let Ok(raw) = windbal_core::decode(response, channels) {
        assert_eq!(raw.values.len(), channels);
        assert_eq!(raw.timestamps.len(), channels);
    }
});
