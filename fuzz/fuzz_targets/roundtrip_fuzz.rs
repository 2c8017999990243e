#![no_main]
use libfuzzer_sys::fuzz_target;
use ipspatch::ips;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the split point between "original" and "modified".
    let payload = &data[1..];
    let split = usize::from(data[0]) * payload.len() / 256;
    let (original, modified) = payload.split_at(split);

    let mut patch = Vec::new();
    ips::encode_all(&mut patch, original, modified).unwrap();

    let patched = ips::apply_all(original, &patch).unwrap();
    assert_eq!(patched, modified);
});
