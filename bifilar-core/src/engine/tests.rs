use super::*;
use bifilar_hal_sim::{render, BusEvent, Fault, Memory, SimBus, SimQueue, SimRegisters, SimSleep};
use heapless::Deque;
use proptest::prelude::*;

type Events = Deque<Event, 8>;
type TestTwi = Twi<SimRegisters, SimQueue, Events>;

const DEVICE: u8 = 0x50;
const TARGET: Target = Target(7);

fn setup() -> (SimBus, TestTwi, SimSleep) {
    let (bus, hw) = SimBus::new();
    let twi = Twi::new(hw.registers, hw.queue, Deque::new(), TwiConfig::STANDARD).unwrap();
    (bus, twi, hw.sleeper)
}

/// Bus with a 64 byte memory at [`DEVICE`] and the engine bound to it
fn bound() -> (SimBus, TestTwi, SimSleep, Memory) {
    let (bus, mut twi, sleeper) = setup();
    let memory = Memory::new(DEVICE, 64);
    bus.attach(memory.clone());
    twi.begin(&Driver::new(DEVICE).unwrap(), Some(TARGET)).unwrap();
    (bus, twi, sleeper, memory)
}

fn event(kind: EventKind, value: i16) -> Event {
    Event {
        kind,
        target: TARGET,
        value,
    }
}

#[test]
fn test_begin_configures_controller() {
    let (bus, mut twi, _sleeper) = setup();
    assert!(!twi.is_bound());

    twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();

    assert!(twi.is_bound());
    assert_eq!(twi.state(), State::Idle);
    assert_eq!(bus.bit_rate(), 72);
    assert_eq!(bus.prescaler(), 0);
    assert!(bus.pullups());
    assert_eq!(bus.commands().last(), Some(&0x45));
}

#[test]
fn test_begin_without_pullups() {
    let (bus, hw) = SimBus::new();
    let config = TwiConfig {
        pullups: false,
        ..TwiConfig::FAST
    };
    let mut twi: TestTwi = Twi::new(hw.registers, hw.queue, Deque::new(), config).unwrap();

    twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();

    assert!(!bus.pullups());
    assert_eq!(bus.bit_rate(), 12);
}

#[test]
fn test_new_rejects_bad_clock() {
    let (_bus, hw) = SimBus::new();
    let config = TwiConfig::new(1_000_000, 400_000);
    let result: Result<TestTwi, _> = Twi::new(hw.registers, hw.queue, Deque::new(), config);
    assert_eq!(result.err(), Some(ConfigError::FrequencyOutOfRange));
}

#[test]
fn test_begin_twice_fails() {
    let (bus, mut twi, mut sleeper, _memory) = bound();
    let other = Driver::new(0x51).unwrap();

    assert_eq!(twi.begin(&other, None), Err(TwiError::Busy));

    twi.end(&mut sleeper);
    assert!(!twi.is_bound());
    assert_eq!(bus.commands().last(), Some(&0x00));
    assert_eq!(twi.begin(&other, None), Ok(()));
}

#[test]
fn test_request_requires_driver() {
    let (_bus, mut twi, _sleeper) = setup();
    assert_eq!(twi.write_request(&[1]).err(), Some(TwiError::Unbound));
    assert_eq!(twi.read_request(&mut [0]).err(), Some(TwiError::Unbound));
}

#[test]
fn test_header_write() {
    let (bus, mut twi, mut sleeper, memory) = bound();

    let request = twi.write_header_request(0x3Au8, &[0x01, 0x02, 0x03]).unwrap();
    assert_eq!(request.len(), 4);
    assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(4));

    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.count(), 4);
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::WriteCompleted, 4)));
    assert_eq!(&memory.contents()[0x3A..0x3D], &[0x01, 0x02, 0x03]);
    assert_eq!(render(&bus.trace()), "S @a0A w3aA w01A w02A w03A P");
}

#[test]
fn test_wide_header_write() {
    let (bus, mut twi, mut sleeper, _memory) = bound();

    assert_eq!(twi.write_header(0x0110u16, &[0xEE], &mut sleeper), Ok(3));
    assert_eq!(render(&bus.trace()), "S @a0A w01A w10A weeA P");
}

#[test]
fn test_header_only_probe() {
    let (bus, mut twi, mut sleeper, memory) = bound();

    assert_eq!(twi.write_header(0x20u8, &[], &mut sleeper), Ok(1));
    assert_eq!(memory.pointer(), 0x20);
    assert_eq!(render(&bus.trace()), "S @a0A w20A P");
}

#[test]
fn test_two_byte_read() {
    let (bus, mut twi, mut sleeper, memory) = bound();
    memory.load(0x10, &[0xCA, 0xFE]);
    twi.write(&[0x10], &mut sleeper).unwrap();
    twi.events.clear();
    bus.clear_trace();

    let mut buf = [0u8; 2];
    let request = twi.read_request(&mut buf).unwrap();
    assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(2));

    assert_eq!(buf, [0xCA, 0xFE]);
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::ReadCompleted, 2)));
    assert_eq!(render(&bus.trace()), "S @a1A rcaA rfeN P");
}

#[test]
fn test_single_byte_read_nacks() {
    let (bus, mut twi, mut sleeper, memory) = bound();
    memory.load(0, &[0x5A]);

    let mut buf = [0u8; 1];
    assert_eq!(twi.read(&mut buf, &mut sleeper), Ok(1));

    assert_eq!(buf, [0x5A]);
    let reads: Vec<BusEvent> = bus
        .trace()
        .into_iter()
        .filter(|e| matches!(e, BusEvent::Read { .. }))
        .collect();
    assert_eq!(reads, vec![BusEvent::Read { byte: 0x5A, ack: false }]);
}

#[test]
fn test_read_across_segments() {
    let (bus, mut twi, mut sleeper, memory) = bound();
    memory.load(0, &[1, 2, 3, 4, 5]);

    let mut head = [0u8; 2];
    let mut none = [0u8; 0];
    let mut tail = [0u8; 3];
    let descriptor = Descriptor::new()
        .rx(&mut head)
        .unwrap()
        .rx(&mut none)
        .unwrap()
        .rx(&mut tail)
        .unwrap();
    let request = twi.request(Direction::Read, descriptor).unwrap();
    assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(5));

    assert_eq!(head, [1, 2]);
    assert_eq!(tail, [3, 4, 5]);
    assert_eq!(render(&bus.trace()), "S @a1A r01A r02A r03A r04A r05N P");
}

#[test]
fn test_write_chains_segments() {
    let (bus, mut twi, mut sleeper, _memory) = bound();

    let descriptor = Descriptor::new()
        .header(0x0102u16)
        .unwrap()
        .tx(&[])
        .unwrap()
        .tx(&[0x09, 0x08])
        .unwrap();
    let request = twi.request(Direction::Write, descriptor).unwrap();
    assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(4));
    assert_eq!(render(&bus.trace()), "S @a0A w01A w02A w09A w08A P");
}

#[test]
fn test_write_longer_than_event_range() {
    let (_bus, mut twi, mut sleeper, _memory) = bound();
    let payload = vec![0x5Au8; 40_000];

    assert_eq!(twi.write(&payload, &mut sleeper), Ok(40_000));

    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.count(), i16::MAX);
    assert_eq!(
        twi.events.pop_front(),
        Some(event(EventKind::WriteCompleted, i16::MAX))
    );
}

#[test]
fn test_read_longer_than_event_range() {
    let (_bus, mut twi, mut sleeper, _memory) = bound();
    let mut buf = vec![0u8; 33_000];

    assert_eq!(twi.read(&mut buf, &mut sleeper), Ok(33_000));
    assert_eq!(
        twi.events.pop_front(),
        Some(event(EventKind::ReadCompleted, i16::MAX))
    );
}

#[test]
fn test_address_nack_returns_to_idle() {
    let (bus, mut twi, mut sleeper) = setup();
    twi.begin(&Driver::new(0x51).unwrap(), Some(TARGET)).unwrap();

    assert_eq!(twi.write(&[0x00], &mut sleeper), Err(TwiError::AddressNack));

    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.count(), -1);
    assert_eq!(twi.last_error(), Some(TwiError::AddressNack));
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::Error, -1)));
    assert_eq!(render(&bus.trace()), "S @a2N P");

    // Nobody home is not a protocol violation: the next request goes out
    let mut buf = [0u8; 1];
    assert_eq!(twi.read(&mut buf, &mut sleeper), Err(TwiError::AddressNack));
}

#[test]
fn test_data_nack_ends_write() {
    let (bus, mut twi, mut sleeper) = setup();
    let memory = Memory::new(DEVICE, 16).accept_at_most(2);
    bus.attach(memory);
    twi.begin(&Driver::new(DEVICE).unwrap(), Some(TARGET)).unwrap();

    assert_eq!(twi.write(&[0x00, 0x11, 0x22, 0x33], &mut sleeper), Ok(3));

    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.last_error(), None);
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::WriteCompleted, 3)));
    assert_eq!(render(&bus.trace()), "S @a0A w00A w11A w22N P");
}

#[test]
fn test_arbitration_lost_at_any_phase() {
    for phase in 0..=3 {
        let (bus, mut twi, mut sleeper, _memory) = bound();
        bus.inject(Fault::ArbitrationLost { phase });

        let result = twi.write(&[0x00, 0x11, 0x22], &mut sleeper);

        assert_eq!(result, Err(TwiError::ArbitrationLost), "phase {}", phase);
        assert_eq!(twi.state(), State::Error);
        assert_eq!(twi.count(), -1);
        assert_eq!(twi.events.pop_front(), Some(event(EventKind::Error, -1)));
        assert!(!bus.trace().iter().any(BusEvent::is_stop), "phase {}", phase);
        assert_eq!(bus.trace().last(), Some(&BusEvent::ArbitrationLost));
    }
}

#[test]
fn test_error_state_until_rebegin() {
    let (bus, mut twi, mut sleeper, _memory) = bound();
    bus.inject(Fault::ArbitrationLost { phase: 1 });
    assert_eq!(twi.write(&[0x00], &mut sleeper), Err(TwiError::ArbitrationLost));

    assert_eq!(twi.write_request(&[0x00]).err(), Some(TwiError::Busy));

    twi.end(&mut sleeper);
    twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();
    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.write(&[0x00], &mut sleeper), Ok(1));
}

#[test]
fn test_bus_error() {
    let (bus, mut twi, mut sleeper, _memory) = bound();
    bus.inject(Fault::BusError { phase: 1 });

    assert_eq!(twi.write(&[0x00, 0x01], &mut sleeper), Err(TwiError::BusError));

    assert_eq!(twi.state(), State::Error);
    assert_eq!(twi.condition(), Condition::BusError);
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::Error, -1)));
    assert!(!bus.trace().iter().any(BusEvent::is_stop));
}

#[test]
fn test_addressed_as_slave_during_master_transfer() {
    let (_bus, mut twi, _sleeper, _memory) = bound();
    let request = twi.write_request(&[0x00]).unwrap();
    drop(request);

    twi.handle(Condition::SrArbLostSlaAck, &mut []);

    assert_eq!(twi.last_error(), Some(TwiError::ArbitrationLost));
    assert_eq!(twi.state(), State::SlaveReceive);
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::Error, -1)));
}

#[test]
fn test_request_while_busy() {
    let (_bus, mut twi, mut sleeper, _memory) = bound();

    let request = twi.write_request(&[0x00]).unwrap();
    drop(request);

    assert!(twi.is_busy());
    assert_eq!(twi.write_request(&[0x01]).err(), Some(TwiError::Busy));
    assert_eq!(twi.await_completed(&mut sleeper, SleepMode::Idle), Ok(0));
}

#[test]
fn test_orphaned_write_ends_at_byte_boundary() {
    let (bus, mut twi, mut sleeper, _memory) = bound();

    let mut request = twi.write_request(&[0x01, 0x02, 0x03]).unwrap();
    // START, then SLA+W, then the first data byte goes out
    sleeper.sleep(SleepMode::Idle, &|| false);
    assert_eq!(request.poll(), None);
    sleeper.sleep(SleepMode::Idle, &|| false);
    assert_eq!(request.poll(), None);
    drop(request);

    assert_eq!(twi.await_completed(&mut sleeper, SleepMode::Idle), Ok(1));
    assert_eq!(render(&bus.trace()), "S @a0A w01A P");
    assert_eq!(twi.events.pop_front(), Some(event(EventKind::WriteCompleted, 1)));
}

#[test]
fn test_orphaned_read_discards() {
    let (bus, mut twi, mut sleeper, memory) = bound();
    memory.load(0, &[0x77]);

    let mut buf = [0u8; 4];
    let request = twi.read_request(&mut buf).unwrap();
    drop(request);

    assert_eq!(twi.await_completed(&mut sleeper, SleepMode::Idle), Ok(0));
    assert_eq!(buf, [0; 4]);
    assert_eq!(render(&bus.trace()), "S @a1A r77N P");
}

#[test]
fn test_end_drains_transfer() {
    let (bus, mut twi, mut sleeper, memory) = bound();

    let request = twi.write_request(&[0x05]).unwrap();
    drop(request);
    twi.end(&mut sleeper);

    assert!(!twi.is_busy());
    assert!(!twi.is_bound());
    assert_eq!(memory.transactions(), 1);
    assert_eq!(render(&bus.trace()), "S @a0A P");
    assert_eq!(bus.commands().last(), Some(&0x00));
}

#[test]
fn test_end_when_idle_does_not_sleep() {
    let (bus, mut twi, mut sleeper, _memory) = bound();
    twi.end(&mut sleeper);
    assert_eq!(bus.sleeps(), 0);
}

#[test]
fn test_await_within_times_out() {
    let (bus, mut twi, mut sleeper, _memory) = bound();
    bus.inject(Fault::ClockStretch { phase: 1 });

    let mut request = twi.write_request(&[0x00, 0x01]).unwrap();
    assert_eq!(
        request.await_within(&mut sleeper, SleepMode::Idle, 8),
        Err(TwiError::Timeout)
    );
    assert!(request.is_busy());
    assert_eq!(bus.sleeps(), 8);
}

#[test]
fn test_await_within_completes() {
    let (_bus, mut twi, mut sleeper, _memory) = bound();

    let mut request = twi.write_request(&[0x00, 0x01]).unwrap();
    assert_eq!(request.await_within(&mut sleeper, SleepMode::Idle, 16), Ok(2));
}

#[test]
fn test_sleep_mode_is_forwarded() {
    let (bus, mut twi, mut sleeper, _memory) = bound();

    let request = twi.write_request(&[0x00]).unwrap();
    request
        .await_completed(&mut sleeper, SleepMode::Standby)
        .unwrap();
    assert_eq!(bus.last_sleep_mode(), Some(SleepMode::Standby));
}

#[test]
fn test_no_events_without_target() {
    let (bus, mut twi, mut sleeper) = setup();
    bus.attach(Memory::new(DEVICE, 4));
    twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();

    assert_eq!(twi.write(&[0x00, 0x01], &mut sleeper), Ok(2));
    assert!(twi.events.is_empty());
}

#[test]
fn test_unknown_status_resets_to_idle_command() {
    let (bus, mut twi, _sleeper, _memory) = bound();

    twi.handle(Condition::Unknown(0xD0), &mut []);

    assert_eq!(twi.state(), State::Idle);
    assert_eq!(twi.condition(), Condition::Unknown(0xD0));
    assert_eq!(bus.commands().last(), Some(&0xC5));
}

#[test]
fn test_no_info_is_ignored() {
    let (bus, mut twi, _sleeper, _memory) = bound();
    let commands = bus.commands().len();

    twi.handle(Condition::NoInfo, &mut []);

    assert_eq!(bus.commands().len(), commands);
}

#[test]
fn test_state_ordering() {
    assert!(!State::Error.is_busy());
    assert!(!State::Idle.is_busy());
    assert!(State::MasterTransmit.is_busy());
    assert!(State::MasterReceive.is_busy());
    assert!(State::SlaveTransmit.is_busy());
    assert!(State::SlaveReceive.is_busy());
}

#[test]
fn test_release() {
    let (_bus, twi, _sleeper) = setup();
    let (_regs, _queue, events) = twi.release();
    assert!(events.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_write_count_is_descriptor_len(
        header in proptest::option::of(any::<u8>()),
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..8), 1..=3),
    ) {
        let (bus, mut twi, mut sleeper) = setup();
        bus.attach(Memory::new(DEVICE, 256));
        twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();

        let mut descriptor = Descriptor::new();
        if let Some(header) = header {
            descriptor = descriptor.header(header).unwrap();
        }
        for payload in &payloads {
            descriptor = descriptor.tx(payload).unwrap();
        }
        let expected = descriptor.len();

        let request = twi.request(Direction::Write, descriptor).unwrap();
        prop_assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(expected));
        prop_assert_eq!(twi.state(), State::Idle);
    }

    #[test]
    fn test_read_count_is_descriptor_len(
        lens in proptest::collection::vec(0usize..8, 1..=4),
    ) {
        let (bus, mut twi, mut sleeper) = setup();
        bus.attach(Memory::new(DEVICE, 32));
        twi.begin(&Driver::new(DEVICE).unwrap(), None).unwrap();

        let mut buffers: Vec<Vec<u8>> = lens.iter().map(|&n| vec![0; n]).collect();
        let mut descriptor = Descriptor::new();
        for buffer in buffers.iter_mut() {
            descriptor = descriptor.rx(buffer).unwrap();
        }
        let expected: usize = lens.iter().sum();

        let request = twi.request(Direction::Read, descriptor).unwrap();
        prop_assert_eq!(request.await_completed(&mut sleeper, SleepMode::Idle), Ok(expected));

        // Only the final byte of the frame is NACKed
        let nacks = bus
            .trace()
            .iter()
            .filter(|e| matches!(e, BusEvent::Read { ack: false, .. }))
            .count();
        prop_assert_eq!(nacks, 1);
    }
}
