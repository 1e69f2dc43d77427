#![no_main]

use jnge_link::frame::validate_response;
use jnge_link::simulator::DeviceSimulator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let sim = DeviceSimulator::default();
    for request in data.chunks(8) {
        if let Some(reply) = sim.handle_request(request) {
            assert!(validate_response(&reply, sim.address()).is_ok());
        }
    }
});
