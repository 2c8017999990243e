#![no_main]
use libfuzzer_sys::fuzz_target;
use ipspatch::ips;

fuzz_target!(|data: &[u8]| {
    // The applier must never panic, only return errors.
    let _ = ips::apply_all(&[], data);

    // Again with a valid header, so record parsing is reached.
    let mut patch = ips::IPS_MAGIC.to_vec();
    patch.extend_from_slice(data);
    let _ = ips::apply_all(data, &patch);
});
