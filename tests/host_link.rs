//! End-to-end tests of the host helper against a target port in the same
//! process, with the debug probe simulated by address translation.

#![cfg(feature = "async")]

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use swd_serial::Error;
use swd_serial::codec::{ESCAPE, MARKER_COUNT};
use swd_serial::handshake::{HandshakeState, MAGIC};
use swd_serial::host::{AsyncDelay, AsyncHostPort, HostConfig};
use swd_serial::io::{Reader, Writer};
use swd_serial::port::{DescriptorSlot, Port, PortDescriptor};
use swd_serial::register::{DCRDR_ADDR, InterruptControl, NVIC_ISPR_ADDR, SharedRegister, nvic_bit};
use swd_serial::ring::RingCb;

const PORT_BASE: u32 = 0x2000_0000;
const DESCRIPTOR_ADDR: u32 = 0x2000_4000;
const IRQ: u16 = 48;

struct TestRegister(AtomicU32);

impl SharedRegister for TestRegister {
    fn read(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn write(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TestIrq {
    enabled: AtomicU32,
}

impl InterruptControl for TestIrq {
    fn irq(&self) -> u16 {
        IRQ
    }

    fn enable(&self) {
        self.enabled.store(1, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.enabled.store(0, Ordering::SeqCst);
    }

    fn pend(&self) {}
}

type TestPort = Port<TestRegister, TestIrq, 16, 32>;

type ReadHook = Box<dyn FnOnce(&TestPort)>;

struct Target {
    port: TestPort,
    descriptor: DescriptorSlot,
    interrupts: AtomicU32,
    // Target code to run once the host has read the given byte
    read_hook: RefCell<Option<(u32, ReadHook)>>,
}

impl Target {
    fn new() -> Self {
        Self {
            port: Port::new(TestRegister(AtomicU32::new(0)), TestIrq::default()),
            descriptor: DescriptorSlot::new(),
            interrupts: AtomicU32::new(0),
            read_hook: RefCell::new(None),
        }
    }

    fn after_read(&self, addr: u32, hook: impl FnOnce(&TestPort) + 'static) {
        *self.read_hook.borrow_mut() = Some((addr, Box::new(hook)));
    }

    fn run_read_hook(&self, addr: u32) {
        let due = matches!(self.read_hook.borrow().as_ref(), Some((at, _)) if *at == addr);
        if due {
            if let Some((_, hook)) = self.read_hook.borrow_mut().take() {
                hook(&self.port);
            }
        }
    }

    fn tx_slot_addr(&self, index: u32) -> u32 {
        self.port.descriptor_at(PORT_BASE).tx_base + RingCb::data_offset() + index
    }

    fn boot(&self) {
        self.port.setup();
        self.descriptor
            .publish(&self.port.descriptor_at(PORT_BASE));
    }

    fn drain(&self) -> Vec<u8> {
        std::iter::from_fn(|| self.port.receive_byte()).collect()
    }

    // Translate a target address into the port in this process.  Only the
    // port's atomics are ever accessed through the returned pointer.
    fn port_ptr(&self, addr: u32, len: usize) -> Option<*const u8> {
        let size = std::mem::size_of::<TestPort>() as u32;
        if addr >= PORT_BASE && addr + len as u32 <= PORT_BASE + size {
            let base = &self.port as *const TestPort as *const u8;
            Some(unsafe { base.add((addr - PORT_BASE) as usize) })
        } else {
            None
        }
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), &'static str> {
        if addr == DCRDR_ADDR && buf.len() == 4 {
            buf.copy_from_slice(&self.port.register_value().to_le_bytes());
            return Ok(());
        }
        if addr == DESCRIPTOR_ADDR && buf.len() == PortDescriptor::WORDS * 4 {
            let words = self
                .descriptor
                .read()
                .map(|d| d.to_words())
                .unwrap_or_default();
            for (chunk, word) in buf.chunks_exact_mut(4).zip(words) {
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            return Ok(());
        }

        let ptr = self.port_ptr(addr, buf.len()).ok_or("read outside target RAM")?;
        if buf.len() == 4 && addr % 4 == 0 {
            let word = unsafe { &*(ptr as *const AtomicU32) }.load(Ordering::SeqCst);
            buf.copy_from_slice(&word.to_le_bytes());
        } else {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = unsafe { &*(ptr.add(i) as *const AtomicU8) }.load(Ordering::SeqCst);
                self.run_read_hook(addr + i as u32);
            }
        }
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), &'static str> {
        let (ispr, bit) = nvic_bit(NVIC_ISPR_ADDR, IRQ);
        if addr == ispr {
            if data == &bit.to_le_bytes()[..] {
                // Take the interrupt straight away
                self.interrupts.fetch_add(1, Ordering::SeqCst);
                self.port.notify();
            }
            return Ok(());
        }

        let ptr = self.port_ptr(addr, data.len()).ok_or("write outside target RAM")?;
        if data.len() == 4 && addr % 4 == 0 {
            let word = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            unsafe { &*(ptr as *const AtomicU32) }.store(word, Ordering::SeqCst);
        } else {
            for (i, byte) in data.iter().enumerate() {
                unsafe { &*(ptr.add(i) as *const AtomicU8) }.store(*byte, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

struct Probe<'a> {
    target: &'a Target,
}

impl Reader for Probe<'_> {
    type Error = &'static str;

    fn read(
        &mut self,
        addr: u32,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        std::future::ready(self.target.read(addr, buf))
    }
}

impl Writer for Probe<'_> {
    type Error = &'static str;

    fn write(
        &mut self,
        addr: u32,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        std::future::ready(self.target.write(addr, data))
    }
}

struct NoDelay;

impl AsyncDelay for NoDelay {
    async fn delay() {}
}

fn host_config() -> HostConfig {
    HostConfig::FromTarget {
        descriptor_ptr: DESCRIPTOR_ADDR,
    }
}

fn receive_all<R: Reader, W: Writer>(host: &mut AsyncHostPort<'_, R, W, NoDelay>) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        match pollster::block_on(host.receive(&mut buf)) {
            Ok(len) => received.extend_from_slice(&buf[..len]),
            Err(Error::BufferEmpty) => return received,
            Err(e) => panic!("receive failed: {e:?}"),
        }
    }
}

#[test]
fn host_waits_for_announcement() {
    let target = Target::new();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    assert_eq!(pollster::block_on(host.probe()), Err(Error::NoTarget));
    assert_eq!(pollster::block_on(host.wait_for_target(3)), Err(Error::Timeout));

    target.boot();
    assert_eq!(target.port.register_value(), MAGIC);
    assert_eq!(pollster::block_on(host.wait_for_target(3)), Ok(0));
    assert_eq!(host.irq(), Some(IRQ));
}

#[test]
fn host_sends_raw_bytes_and_notifies() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());
    pollster::block_on(host.wait_for_target(1)).unwrap();

    let message = b"ls\0-l\x80\r";
    assert_eq!(pollster::block_on(host.send(message)), Ok(message.len()));
    assert_eq!(target.interrupts.load(Ordering::SeqCst), 1);
    assert_eq!(pollster::block_on(host.probe()), Ok(1));

    assert_eq!(target.drain(), message.to_vec());
    assert_eq!(target.port.state(), HandshakeState::Active);
}

#[test]
fn host_send_is_bounded_by_free_slots() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    let data: Vec<u8> = (1..=40).collect();
    assert_eq!(pollster::block_on(host.send(&data)), Ok(15));
    assert_eq!(pollster::block_on(host.send(&data[15..])), Err(Error::BufferFull));

    assert_eq!(target.drain(), data[..15].to_vec());
    assert_eq!(pollster::block_on(host.send(&data[15..])), Ok(15));
    assert_eq!(target.drain(), data[15..30].to_vec());

    // Wrapped around the end of the ring
    pollster::block_on(host.send_all(&data[30..])).unwrap();
    assert_eq!(target.drain(), data[30..].to_vec());
}

#[test]
fn target_output_with_zeros_survives_wraparound() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    let payload = [b'a', 0, 0, 0, b'b', ESCAPE, 0, b'c', ESCAPE, ESCAPE];
    let mut expected = Vec::new();
    let mut received = Vec::new();
    for _ in 0..10 {
        assert_eq!(target.port.send(&payload), Ok(payload.len()));
        expected.extend_from_slice(&payload);
        received.extend(receive_all(&mut host));
    }
    assert_eq!(received, expected);

    // Every consumed slot was handed back cleared
    assert!(target.port.tx().is_empty());
    assert_eq!(pollster::block_on(host.receive(&mut [0u8; 8])), Err(Error::BufferEmpty));
}

#[test]
fn full_target_ring_recovers_after_host_reads() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    let mut sent = Vec::new();
    let mut byte = 1u8;
    while target.port.send_byte(byte).is_ok() {
        sent.push(byte);
        byte += 1;
    }
    assert_eq!(sent.len(), 31);
    assert_eq!(target.port.send_byte(byte), Err(Error::BufferFull));
    assert_eq!(target.port.stats().tx_full, 1);

    assert_eq!(receive_all(&mut host), sent);
    assert_eq!(target.port.send_byte(byte), Ok(()));
    assert_eq!(receive_all(&mut host), vec![byte]);
}

#[test]
fn escape_in_last_slot_waits_for_count() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    // Fill all but the last usable slot, then put an escape there with its
    // count still to come.  Raw pushes stand in for a producer that writes
    // the pair in order.
    let filler = vec![b'x'; 30];
    for &byte in &filler {
        target.port.tx().try_push(byte).unwrap();
    }
    target.port.tx().try_push(ESCAPE).unwrap();
    assert!(target.port.tx().is_full());

    let mut buf = [0u8; 64];
    assert_eq!(pollster::block_on(host.receive(&mut buf)), Ok(30));
    assert_eq!(&buf[..30], &filler[..]);
    assert_eq!(target.port.tx().len(), 1);

    target.port.tx().try_push(4).unwrap();
    assert_eq!(receive_all(&mut host), vec![0, 0, 0, 0]);
    assert!(target.port.tx().is_empty());
}

#[test]
fn escape_mid_ring_waits_for_count() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    // A producer queueing one byte at a time publishes the escape first
    target.port.tx().try_push(b'a').unwrap();
    target.port.tx().try_push(ESCAPE).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(pollster::block_on(host.receive(&mut buf)), Ok(1));
    assert_eq!(buf[0], b'a');
    assert_eq!(pollster::block_on(host.receive(&mut buf)), Err(Error::BufferEmpty));
    assert_eq!(target.port.tx().len(), 1);

    target.port.tx().try_push(2).unwrap();
    assert_eq!(receive_all(&mut host), vec![0, 0]);

    target.port.tx().try_push(ESCAPE).unwrap();
    assert_eq!(receive_all(&mut host), Vec::<u8>::new());
    target.port.tx().try_push(MARKER_COUNT).unwrap();
    assert_eq!(receive_all(&mut host), vec![ESCAPE]);
    assert!(target.port.tx().is_empty());
}

// Queue `payload` as one escape pair split across the end of the ring, with
// the target writing it while the host is part way through its scan: after
// the host has read slot 0 but before it reads the last slot.
fn escape_pair_written_during_scan(payload: &'static [u8]) {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    let filler = [b'x'; 31];
    assert_eq!(target.port.send(&filler), Ok(31));
    assert_eq!(receive_all(&mut host), filler.to_vec());
    assert_eq!(target.port.tx().control_block().tail, 31);

    target.after_read(target.tx_slot_addr(0), move |port| {
        assert_eq!(port.send(payload), Ok(payload.len()));
    });
    let mut buf = [0u8; 8];
    assert_eq!(pollster::block_on(host.receive(&mut buf)), Err(Error::BufferEmpty));
    assert_eq!(target.port.tx().len(), 2);

    assert_eq!(receive_all(&mut host), payload.to_vec());
    assert!(target.port.tx().is_empty());
    assert_eq!(target.port.tx().control_block().tail, 1);
}

#[test]
fn zero_run_split_across_wrap_during_scan() {
    escape_pair_written_during_scan(&[0, 0, 0]);
}

#[test]
fn escape_byte_split_across_wrap_during_scan() {
    escape_pair_written_during_scan(&[ESCAPE]);
}

#[test]
fn zero_run_larger_than_buffer_is_reported() {
    let target = Target::new();
    target.boot();
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host = AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, host_config());

    target.port.send(&[0u8; 10]).unwrap();
    let mut small = [0u8; 4];
    assert_eq!(
        pollster::block_on(host.receive(&mut small)),
        Err(Error::BufferTooSmall)
    );
    let mut large = [0xFFu8; 16];
    assert_eq!(pollster::block_on(host.receive(&mut large)), Ok(10));
    assert_eq!(&large[..10], &[0u8; 10]);
}

#[test]
fn direct_config_skips_discovery() {
    let target = Target::new();
    target.boot();
    let descriptor = target.port.descriptor_at(PORT_BASE);
    let (mut reader, mut writer) = (Probe { target: &target }, Probe { target: &target });
    let mut host =
        AsyncHostPort::<_, _, NoDelay>::new(&mut reader, &mut writer, HostConfig::from(descriptor));

    target.port.send(b"ok").unwrap();
    assert_eq!(receive_all(&mut host), b"ok".to_vec());

    // Re-running setup discards what the host has not read
    target.port.send(b"lost").unwrap();
    target.port.setup();
    assert_eq!(receive_all(&mut host), Vec::<u8>::new());
    assert_eq!(pollster::block_on(host.probe()), Ok(0));
}
