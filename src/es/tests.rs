//! Device-level tests driving ES through encoded ioctlv command buffers.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use tempfile::TempDir;

use super::*;
use crate::ReturnCode;
use crate::crypto::{content_iv, decrypt_cbc, encrypt_cbc};
use crate::formats::ticket::Ticket;
use crate::formats::ticket::tests::build_ticket;
use crate::formats::tmd::Tmd;
use crate::formats::tmd::tests::build_tmd;
use crate::formats::wad::tests::build_wad;
use crate::host::{DefaultIdentity, EmulatorHooks, Kernel};
use crate::keys::{KeyIndex, SD_KEY};
use crate::memory::Ram;
use crate::title::low;

const TITLE_ID: u64 = 0x0001_0001_5745_5354;
const IOS56: u64 = 0x0000_0001_0000_0038;
const TITLE_KEY: [u8; 16] = [0x5a; 16];

const RAM_BASE: u32 = 0x9000_0000;
const RAM_SIZE: usize = 0x10_0000;

const ADD_TICKET: u32 = 0x01;
const ADD_TITLE_START: u32 = 0x02;
const ADD_CONTENT_START: u32 = 0x03;
const ADD_CONTENT_DATA: u32 = 0x04;
const ADD_CONTENT_FINISH: u32 = 0x05;
const ADD_TITLE_FINISH: u32 = 0x06;
const LAUNCH: u32 = 0x08;
const OPEN_CONTENT: u32 = 0x09;
const READ_CONTENT: u32 = 0x0A;
const CLOSE_CONTENT: u32 = 0x0B;
const GET_OWNED_TITLE_COUNT: u32 = 0x0C;
const GET_TITLE_COUNT: u32 = 0x0E;
const GET_TITLES: u32 = 0x0F;
const GET_TITLE_CONTENTS_COUNT: u32 = 0x10;
const GET_VIEW_COUNT: u32 = 0x12;
const GET_VIEWS: u32 = 0x13;
const DELETE_TITLE: u32 = 0x17;
const GET_TITLE_DIRECTORY: u32 = 0x1D;
const GET_TITLE_ID: u32 = 0x20;
const SEEK_CONTENT: u32 = 0x23;
const OPEN_TITLE_CONTENT: u32 = 0x24;
const LAUNCH_BC: u32 = 0x25;
const EXPORT_TITLE_INIT: u32 = 0x26;
const EXPORT_CONTENT_BEGIN: u32 = 0x27;
const EXPORT_CONTENT_DATA: u32 = 0x28;
const EXPORT_CONTENT_END: u32 = 0x29;
const EXPORT_TITLE_DONE: u32 = 0x2A;
const ENCRYPT: u32 = 0x2C;
const DECRYPT: u32 = 0x2D;
const GET_STORED_CONTENT_COUNT: u32 = 0x32;
const GET_STORED_CONTENTS: u32 = 0x33;
const GET_TMD_STORED_CONTENT_COUNT: u32 = 0x39;

#[derive(Debug, Default)]
struct TestKernel {
    version: u16,
    reloads: Vec<u64>,
    bootstraps: Vec<(u64, Vec<u8>)>,
    acks: Vec<u32>,
}

impl Kernel for TestKernel {
    fn version(&self) -> u16 {
        self.version
    }

    fn reload_ios(&mut self, ios_title_id: u64) -> bool {
        self.reloads.push(ios_title_id);
        true
    }

    fn bootstrap_ppc(&mut self, tmd: &Tmd, boot_content: &[u8]) -> bool {
        self.bootstraps.push((tmd.title_id(), boot_content.to_vec()));
        true
    }

    fn enqueue_command_acknowledgement(&mut self, address: u32) {
        self.acks.push(address);
    }
}

#[derive(Debug, Default)]
struct Recorded {
    games: Vec<RunningGame>,
    alerts: Vec<String>,
}

struct RecordingHooks(Rc<RefCell<Recorded>>);

impl EmulatorHooks for RecordingHooks {
    fn running_game_changed(&mut self, game: &RunningGame) {
        self.0.borrow_mut().games.push(game.clone());
    }

    fn panic_alert(&mut self, message: &str) {
        self.0.borrow_mut().alerts.push(message.to_owned());
    }
}

/// An ES device over a temporary NAND, with guest memory and a kernel that
/// record what ES asks of them.
struct Harness {
    dir: TempDir,
    es: EsDevice,
    state: EsState,
    kernel: TestKernel,
    memory: Ram,
    recorded: Rc<RefCell<Recorded>>,
    next: u32,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let mut harness = Self {
            es: Self::device(&dir),
            dir,
            state: EsState::new(Box::new(RecordingHooks(recorded.clone()))),
            kernel: TestKernel::default(),
            memory: Ram::new(RAM_BASE, RAM_SIZE),
            recorded,
            next: RAM_BASE + 0x100,
        };
        harness.es.open();
        harness
    }

    fn device(dir: &TempDir) -> EsDevice {
        let config = EsConfig::with_nand_root(dir.path().join("nand"));
        EsDevice::new(config, Box::new(DefaultIdentity::default())).unwrap()
    }

    /// Replace the device as an IOS reload would and bring the new one up.
    fn reload(&mut self) {
        self.es = Self::device(&self.dir);
        let mut env = EsEnv::new(&mut self.state, &mut self.kernel, &mut self.memory);
        self.es.init(&mut env);
        self.es.open();
    }

    fn alloc(&mut self, size: u32) -> u32 {
        let address = self.next;
        self.next = (address + size + 0x1F) & !0x1F;
        address
    }

    fn input(&mut self, data: &[u8]) -> IoVector {
        let address = self.alloc(data.len() as u32);
        self.memory.copy_to_emu(address, data).unwrap();
        IoVector::new(address, data.len() as u32)
    }

    fn input_u32(&mut self, value: u32) -> IoVector {
        self.input(&value.to_be_bytes())
    }

    fn input_u64(&mut self, value: u64) -> IoVector {
        self.input(&value.to_be_bytes())
    }

    fn output(&mut self, size: u32) -> IoVector {
        let address = self.alloc(size);
        self.memory.memset(address, 0xEE, size).unwrap();
        IoVector::new(address, size)
    }

    fn read(&self, vector: IoVector) -> Vec<u8> {
        self.memory.read_bytes(vector.address, vector.size).unwrap()
    }

    fn read_u32(&self, vector: IoVector) -> u32 {
        self.memory.read_u32(vector.address).unwrap()
    }

    /// Encode an ioctlv command buffer and hand it to the device.
    fn ioctlv(&mut self, request: u32, ins: &[IoVector], ios: &[IoVector]) -> IpcReply {
        let table = self.alloc(((ins.len() + ios.len()) * 8) as u32);
        for (i, vector) in ins.iter().chain(ios).enumerate() {
            let entry = table + i as u32 * 8;
            self.memory.write_u32(entry, vector.address).unwrap();
            self.memory.write_u32(entry + 4, vector.size).unwrap();
        }
        let command = self.alloc(0x40);
        self.memory.write_u32(command, 7).unwrap();
        self.memory.write_u32(command + 0x0C, request).unwrap();
        self.memory.write_u32(command + 0x10, ins.len() as u32).unwrap();
        self.memory.write_u32(command + 0x14, ios.len() as u32).unwrap();
        self.memory.write_u32(command + 0x18, table).unwrap();

        let mut env = EsEnv::new(&mut self.state, &mut self.kernel, &mut self.memory);
        self.es.handle_ipc(&mut env, command)
    }

    fn call(&mut self, request: u32, ins: &[IoVector], ios: &[IoVector]) -> i32 {
        self.ioctlv(request, ins, ios).return_value
    }

    /// Install a title directly on the NAND: TMD, ticket and one decrypted
    /// content per entry of `contents` (IDs from 0x100, indices from 0).
    fn install(&self, title_id: u64, contents: &[&[u8]]) -> Tmd {
        let records: Vec<_> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| (0x100 + i as u32, i as u16, 1u16, c.len() as u64))
            .collect();
        let tmd = Tmd::parse(build_tmd(title_id, IOS56, &records)).unwrap();
        let ticket = Ticket::parse(build_ticket(title_id, 1, &TITLE_KEY)).unwrap();

        let nand = self.es.nand();
        nand.write_tmd(&tmd).unwrap();
        nand.add_ticket(&ticket).unwrap();
        for (content, data) in tmd.contents().iter().zip(contents) {
            nand.write_content(title_id, content, data).unwrap();
        }
        tmd
    }
}

fn none() -> IoVector {
    IoVector::default()
}

#[test]
fn installs_title_through_ioctls() {
    let mut h = Harness::new();
    let plain: Vec<u8> = (0..0x30u8).collect();
    let tmd = build_tmd(TITLE_ID, IOS56, &[(0x100, 0, 1, plain.len() as u64)]);
    let encrypted = encrypt_cbc(&TITLE_KEY, &mut content_iv(0), &plain).unwrap();

    let ticket = h.input(&build_ticket(TITLE_ID, 1, &TITLE_KEY));
    assert_eq!(h.call(ADD_TICKET, &[ticket, none(), none()], &[]), 0);
    let tmd = h.input(&tmd);
    assert_eq!(h.call(ADD_TITLE_START, &[tmd, none(), none(), none()], &[]), 0);

    let (tid, cid) = (h.input_u64(TITLE_ID), h.input_u32(0x100));
    assert_eq!(h.call(ADD_CONTENT_START, &[tid, cid], &[]), 0);
    let (fd, data) = (h.input_u32(0), h.input(&encrypted));
    assert_eq!(h.call(ADD_CONTENT_DATA, &[fd, data], &[]), 0);
    assert_eq!(h.call(ADD_CONTENT_FINISH, &[fd], &[]), 0);
    assert_eq!(h.call(ADD_TITLE_FINISH, &[], &[]), 0);

    let stored = fs::read(h.es.nand().content_path(TITLE_ID, 0x100)).unwrap();
    assert_eq!(stored, plain);

    let count = h.output(4);
    assert_eq!(h.call(GET_TITLE_COUNT, &[], &[count]), 0);
    assert_eq!(h.read_u32(count), 1);
    let owned = h.output(4);
    assert_eq!(h.call(GET_OWNED_TITLE_COUNT, &[], &[owned]), 0);
    assert_eq!(h.read_u32(owned), 1);

    let (max, titles) = (h.input_u32(4), h.output(4 * 8));
    assert_eq!(h.call(GET_TITLES, &[max], &[titles]), 0);
    assert_eq!(h.read(titles)[..8], TITLE_ID.to_be_bytes());
}

#[test]
fn import_accepts_one_content_at_a_time() {
    let mut h = Harness::new();
    let tmd = h.input(&build_tmd(TITLE_ID, IOS56, &[(0x100, 0, 1, 0x10), (0x101, 1, 1, 0x10)]));
    assert_eq!(h.call(ADD_TITLE_START, &[tmd, none(), none(), none()], &[]), 0);

    let tid = h.input_u64(TITLE_ID);
    let (first, second) = (h.input_u32(0x100), h.input_u32(0x101));
    assert_eq!(h.call(ADD_CONTENT_START, &[tid, first], &[]), 0);
    assert_eq!(
        h.call(ADD_CONTENT_START, &[tid, second], &[]),
        ReturnCode::ES_WRITE_FAILURE.0
    );
    assert_eq!(h.es.import().content_id(), Some(0x100));

    // no ticket installed yet
    let fd = h.input_u32(0);
    assert_eq!(
        h.call(ADD_CONTENT_FINISH, &[fd], &[]),
        ReturnCode::ES_NO_TICKET_INSTALLED.0
    );
}

#[test]
fn empty_nand_has_no_titles() {
    let mut h = Harness::new();
    let count = h.output(4);
    assert_eq!(h.call(GET_TITLE_COUNT, &[], &[count]), 0);
    assert_eq!(h.read_u32(count), 0);
}

#[test]
fn open_content_needs_an_active_title() {
    let mut h = Harness::new();
    let index = h.input_u32(0);
    assert_eq!(
        h.call(OPEN_CONTENT, &[index], &[]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
}

#[test]
fn wrong_vector_count_is_rejected() {
    let mut h = Harness::new();
    let count = h.output(4);
    assert_eq!(
        h.call(GET_TITLE_COUNT, &[count], &[]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
}

#[test]
fn reads_are_clamped_to_the_content() {
    let mut h = Harness::new();
    let plain: Vec<u8> = (0..0x30u8).collect();
    h.install(TITLE_ID, &[&plain]);

    let (tid, index) = (h.input_u64(TITLE_ID), h.input_u32(0));
    let cfd = h.call(OPEN_TITLE_CONTENT, &[tid, none(), index], &[]);
    assert_eq!(cfd, 0);

    let fd = h.input_u32(cfd as u32);
    let buf = h.output(0x100);
    assert_eq!(h.call(READ_CONTENT, &[fd], &[buf]), 0x30);
    assert_eq!(h.read(buf)[..0x30], plain[..]);
    assert_eq!(h.call(READ_CONTENT, &[fd], &[buf]), 0);

    let (offset, mode) = (h.input_u32(0x10), h.input_u32(0));
    assert_eq!(h.call(SEEK_CONTENT, &[fd, offset, mode], &[]), 0x10);
    let small = h.output(4);
    assert_eq!(h.call(READ_CONTENT, &[fd], &[small]), 4);
    assert_eq!(h.read(small), plain[0x10..0x14]);

    assert_eq!(h.call(CLOSE_CONTENT, &[fd], &[]), 0);
    assert_eq!(h.call(READ_CONTENT, &[fd], &[small]), ReturnCode::IPC_EACCES.0);
}

#[test]
fn missing_content_fails_to_open() {
    let mut h = Harness::new();
    h.install(TITLE_ID, &[b"0123456789abcdef"]);

    let (tid, index) = (h.input_u64(TITLE_ID), h.input_u32(7));
    assert_eq!(
        h.call(OPEN_TITLE_CONTENT, &[tid, none(), index], &[]),
        ReturnCode::IPC_EACCES.0
    );
}

#[test]
fn system_titles_cannot_be_deleted() {
    let mut h = Harness::new();
    let tid = h.input_u64(0x0000_0001_0000_0001);
    assert_eq!(
        h.call(DELETE_TITLE, &[tid], &[]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
    // past the protected range the title is looked up, and is missing here
    let tid = h.input_u64(0x0000_0001_0000_0102);
    assert_eq!(h.call(DELETE_TITLE, &[tid], &[]), ReturnCode::FS_ENOENT.0);

    let missing = h.input_u64(TITLE_ID);
    assert_eq!(h.call(DELETE_TITLE, &[missing], &[]), ReturnCode::FS_ENOENT.0);
}

#[test]
fn deletes_installed_title() {
    let mut h = Harness::new();
    h.install(TITLE_ID, &[b"0123456789abcdef"]);

    let tid = h.input_u64(TITLE_ID);
    assert_eq!(h.call(DELETE_TITLE, &[tid], &[]), 0);
    assert!(!h.es.nand().title_dir(TITLE_ID).exists());
}

#[test]
fn launch_reloads_ios_then_bootstraps() {
    let mut h = Harness::new();
    let dol = vec![0x44u8; 0x40];
    h.install(TITLE_ID, &[&dol]);

    let (tid, view) = (h.input_u64(TITLE_ID), h.input(&[0u8; 0xD8]));
    let reply = h.ioctlv(LAUNCH, &[tid, view], &[]);
    assert!(!reply.send_reply);
    assert_eq!(h.kernel.reloads, [IOS56]);
    assert_eq!(h.kernel.acks.len(), 1);
    assert!(h.kernel.bootstraps.is_empty());
    assert_eq!(
        h.state.launch_phase(),
        LaunchPhase::AwaitingServiceReload { target: TITLE_ID }
    );

    h.reload();
    assert_eq!(h.kernel.reloads, [IOS56]);
    assert_eq!(h.kernel.bootstraps, [(TITLE_ID, dol)]);
    assert_eq!(h.state.launch_phase(), LaunchPhase::Idle);
    assert_eq!(h.state.title().title_id(), Some(TITLE_ID));

    {
        let recorded = h.recorded.borrow();
        assert_eq!(recorded.games.len(), 1);
        assert_eq!(recorded.games[0].title_id, TITLE_ID);
        assert_eq!(recorded.games[0].game_id, "0001000157455354");
    }

    let out = h.output(8);
    assert_eq!(h.call(GET_TITLE_ID, &[], &[out]), 0);
    assert_eq!(h.read(out), TITLE_ID.to_be_bytes());
}

#[test]
fn failed_launch_reports_invalid_tmd() {
    let mut h = Harness::new();
    let (tid, view) = (h.input_u64(TITLE_ID), h.input(&[0u8; 0xD8]));
    assert_eq!(h.call(LAUNCH, &[tid, view], &[]), ReturnCode::ES_INVALID_TMD.0);

    assert!(h.kernel.acks.is_empty());
    assert!(h.kernel.reloads.is_empty());
    assert!(!h.state.title().is_active());
    assert_eq!(h.state.launch_phase(), LaunchPhase::Idle);
    assert_eq!(h.recorded.borrow().alerts.len(), 1);
}

#[test]
fn launch_bc_is_refused_under_mios() {
    let mut h = Harness::new();
    h.kernel.version = low(crate::title::TITLEID_MIOS) as u16;
    assert_eq!(
        h.call(LAUNCH_BC, &[], &[]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
    assert!(h.kernel.reloads.is_empty());
}

#[test]
fn export_chains_ciphertext_across_calls() {
    let mut h = Harness::new();
    let plain: Vec<u8> = (0..0x40u8).map(|b| b.wrapping_mul(7)).collect();
    let tmd = h.install(TITLE_ID, &[&plain]);

    let tid = h.input_u64(TITLE_ID);
    let tmd_out = h.output(tmd.raw().len() as u32);
    assert_eq!(h.call(EXPORT_TITLE_INIT, &[tid], &[tmd_out]), 0);
    assert_eq!(h.read(tmd_out), tmd.raw());
    let again = h.output(tmd.raw().len() as u32);
    assert_eq!(
        h.call(EXPORT_TITLE_INIT, &[tid], &[again]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );

    let content_id = h.input_u32(0x100);
    let cid = h.call(EXPORT_CONTENT_BEGIN, &[tid, content_id], &[]);
    assert_eq!(cid, 0);

    let cid = h.input_u32(cid as u32);
    let mut exported = Vec::new();
    for _ in 0..2 {
        let out = h.output(0x20);
        assert_eq!(h.call(EXPORT_CONTENT_DATA, &[cid], &[out]), 0);
        exported.extend(h.read(out));
    }
    let expected = encrypt_cbc(&TITLE_KEY, &mut content_iv(0), &plain).unwrap();
    assert_eq!(exported, expected);

    assert_eq!(h.call(EXPORT_CONTENT_END, &[cid], &[]), 0);
    assert_eq!(h.call(EXPORT_TITLE_DONE, &[], &[]), 0);
    assert!(!h.es.export().is_valid());
}

#[test]
fn export_end_requires_fully_read_content() {
    let mut h = Harness::new();
    h.install(TITLE_ID, &[&[0x11u8; 0x40]]);

    let tid = h.input_u64(TITLE_ID);
    let tmd_out = h.output(0x1E4 + 0x24);
    assert_eq!(h.call(EXPORT_TITLE_INIT, &[tid], &[tmd_out]), 0);
    let content_id = h.input_u32(0x100);
    assert_eq!(h.call(EXPORT_CONTENT_BEGIN, &[tid, content_id], &[]), 0);

    let cid = h.input_u32(0);
    assert_eq!(
        h.call(EXPORT_CONTENT_END, &[cid], &[]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
}

#[test]
fn sd_key_encryption_round_trips() {
    let mut h = Harness::new();
    let data: Vec<u8> = (0..0x20u8).collect();
    let iv = [0x01u8; 16];

    let (key, iv_in, data_in) = (h.input_u32(KeyIndex::Sd as u32), h.input(&iv), h.input(&data));
    let (iv_out, out) = (h.output(16), h.output(0x20));
    assert_eq!(h.call(ENCRYPT, &[key, iv_in, data_in], &[iv_out, out]), 0);

    let expected = encrypt_cbc(&SD_KEY, &mut iv.clone(), &data).unwrap();
    let ciphertext = h.read(out);
    assert_eq!(ciphertext, expected);
    assert_eq!(h.read(iv_out), expected[0x10..]);

    let (iv_in, cipher_in) = (h.input(&iv), h.input(&ciphertext));
    let (iv_out, out) = (h.output(16), h.output(0x20));
    assert_eq!(h.call(DECRYPT, &[key, iv_in, cipher_in], &[iv_out, out]), 0);
    assert_eq!(h.read(out), data);
    assert_eq!(
        decrypt_cbc(&SD_KEY, &mut iv.clone(), &ciphertext).unwrap(),
        data
    );
}

#[test]
fn unknown_key_slot_is_rejected() {
    let mut h = Harness::new();
    let (key, iv_in, data_in) = (h.input_u32(11), h.input(&[0u8; 16]), h.input(&[0u8; 16]));
    let (iv_out, out) = (h.output(16), h.output(16));
    assert_eq!(
        h.call(ENCRYPT, &[key, iv_in, data_in], &[iv_out, out]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
}

#[test]
fn di_verify_activates_disc_title() {
    let mut h = Harness::new();
    let tmd = build_tmd(TITLE_ID, IOS56, &[(0, 0, 1, 0x20)]);
    let ticket = build_ticket(TITLE_ID, 1, &TITLE_KEY);

    h.es.di_verify(&mut h.state, tmd, ticket).unwrap();
    assert_eq!(h.state.title().title_id(), Some(TITLE_ID));
    assert!(h.es.nand().has_tmd(TITLE_ID));
    assert!(h.es.nand().title_data_dir(TITLE_ID).is_dir());
    assert_eq!(h.recorded.borrow().games.len(), 1);

    let out = h.output(8);
    assert_eq!(h.call(GET_TITLE_ID, &[], &[out]), 0);
    assert_eq!(h.read(out), TITLE_ID.to_be_bytes());
}

#[test]
fn views_match_view_count_for_multi_ticket_files() {
    let mut h = Harness::new();
    h.install(TITLE_ID, &[b"data"]);
    let mut tickets = build_ticket(TITLE_ID, 0xaaaa, &TITLE_KEY);
    tickets.extend_from_slice(&build_ticket(TITLE_ID, 0xbbbb, &TITLE_KEY));
    fs::write(h.es.nand().ticket_path(TITLE_ID), tickets).unwrap();

    let tid = h.input_u64(TITLE_ID);
    let count = h.output(4);
    assert_eq!(h.call(GET_VIEW_COUNT, &[tid], &[count]), 0);
    assert_eq!(h.read_u32(count), 2);

    let max = h.input_u32(2);
    let views = h.output(2 * 0xD8);
    assert_eq!(h.call(GET_VIEWS, &[tid, max], &[views]), 0);
    let views = h.read(views);
    assert_eq!(&views[4..12], &0xaaaau64.to_be_bytes());
    assert_eq!(&views[0xD8..0xDC], &1u32.to_be_bytes());
    assert_eq!(&views[0xDC..0xE4], &0xbbbbu64.to_be_bytes());
    assert_eq!(&views[0xE8..0xF0], &TITLE_ID.to_be_bytes());
}

#[test]
fn di_verify_survives_blocked_data_directory() {
    let mut h = Harness::new();
    let data_dir = h.es.nand().title_data_dir(TITLE_ID);
    std::fs::create_dir_all(data_dir.parent().unwrap()).unwrap();
    std::fs::write(&data_dir, b"not a directory").unwrap();

    let tmd = build_tmd(TITLE_ID, IOS56, &[(0, 0, 1, 0x20)]);
    let ticket = build_ticket(TITLE_ID, 1, &TITLE_KEY);
    h.es.di_verify(&mut h.state, tmd, ticket).unwrap();

    assert_eq!(h.state.title().title_id(), Some(TITLE_ID));
    assert!(h.es.nand().has_tmd(TITLE_ID));
    assert!(data_dir.is_file());
}

#[test]
fn di_verify_rejects_mismatched_ticket() {
    let mut h = Harness::new();
    let tmd = build_tmd(TITLE_ID, IOS56, &[]);
    let ticket = build_ticket(TITLE_ID + 1, 1, &TITLE_KEY);

    assert!(h.es.di_verify(&mut h.state, tmd, ticket).is_err());
    assert!(!h.state.title().is_active());
}

#[test]
fn wad_overrides_nand_for_active_title() {
    let mut h = Harness::new();
    let plain: Vec<u8> = (0..0x20u8).rev().collect();
    let path = h.dir.path().join("boot.wad");
    fs::write(&path, build_wad(TITLE_ID, &TITLE_KEY, &[plain.clone()])).unwrap();

    h.es.load_wad(&mut h.state, path.clone()).unwrap();
    assert_eq!(h.state.content_file(), Some(path.as_path()));
    assert_eq!(h.state.title().title_id(), Some(TITLE_ID));

    let index = h.input_u32(0);
    let cfd = h.call(OPEN_CONTENT, &[index], &[]);
    assert_eq!(cfd, 0);
    let (fd, buf) = (h.input_u32(0), h.output(0x20));
    assert_eq!(h.call(READ_CONTENT, &[fd], &[buf]), 0x20);
    assert_eq!(h.read(buf), plain);
}

#[test]
fn stored_contents_skip_missing_files() {
    let mut h = Harness::new();
    let tmd = h.install(TITLE_ID, &[&[1u8; 0x10], &[2u8; 0x10]]);
    fs::remove_file(h.es.nand().content_path(TITLE_ID, 0x101)).unwrap();

    let tid = h.input_u64(TITLE_ID);
    let count = h.output(4);
    assert_eq!(h.call(GET_TITLE_CONTENTS_COUNT, &[tid], &[count]), 0);
    assert_eq!(h.read_u32(count), 2);

    let count = h.output(4);
    assert_eq!(h.call(GET_STORED_CONTENT_COUNT, &[tid], &[count]), 0);
    assert_eq!(h.read_u32(count), 1);

    let (max, ids) = (h.input_u32(1), h.output(4));
    assert_eq!(h.call(GET_STORED_CONTENTS, &[tid, max], &[ids]), 0);
    assert_eq!(h.read_u32(ids), 0x100);

    let (inline, count) = (h.input(tmd.raw()), h.output(4));
    assert_eq!(h.call(GET_TMD_STORED_CONTENT_COUNT, &[inline], &[count]), 0);
    assert_eq!(h.read_u32(count), 1);
}

#[test]
fn title_directory_is_clamped_to_buffer() {
    let mut h = Harness::new();
    let tid = h.input_u64(TITLE_ID);
    let out = h.output(0x1E);
    assert_eq!(h.call(GET_TITLE_DIRECTORY, &[tid], &[out]), 0);
    assert_eq!(h.read(out), b"/title/00010001/57455354/data\0");
}

#[test]
fn unknown_selectors_succeed() {
    let mut h = Harness::new();
    assert_eq!(h.call(0x40, &[], &[]), 0);
    assert_eq!(h.call(0x31, &[], &[]), 0);
}

#[test]
fn unmapped_output_buffer_does_not_stop_dispatch() {
    let mut h = Harness::new();
    let unmapped = IoVector::new(0x1000, 4);
    assert_eq!(h.call(0x40, &[], &[unmapped]), 0);

    // the handler still runs and reports the failed write
    h.install(TITLE_ID, &[b"data"]);
    let tid = h.input_u64(TITLE_ID);
    assert_eq!(
        h.call(GET_TITLE_CONTENTS_COUNT, &[tid], &[unmapped]),
        ReturnCode::ES_PARAMETER_SIZE_OR_ALIGNMENT.0
    );
}

#[test]
fn close_drops_open_contents_and_sessions() {
    let mut h = Harness::new();
    h.install(TITLE_ID, &[&[0u8; 0x10]]);
    let (tid, index) = (h.input_u64(TITLE_ID), h.input_u32(0));
    assert_eq!(h.call(OPEN_TITLE_CONTENT, &[tid, none(), index], &[]), 0);
    assert_eq!(h.es.opened().len(), 1);

    h.es.close();
    assert!(h.es.opened().is_empty());
    assert!(!h.es.is_active());

    // numbering restarts after a close
    h.es.open();
    assert_eq!(h.call(OPEN_TITLE_CONTENT, &[tid, none(), index], &[]), 0);
}
