//! MPEG-PS 封装/解封装集成测试

use std::cell::RefCell;
use std::rc::Rc;

use liu::codec::CodecId;
use liu::core::{BitWriter, LiuError};
use liu::format::pes::write_timestamp;
use liu::format::ps::{PackHeader, PsRecord, PsRecordKind};
use liu::format::{DemuxedFrame, IoContext, PsDemuxer, PsMuxer, PsMuxerConfig, PsStreamType};

const SPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x67, 0x4D, 0x00, 0x28, 0xE9];
const PPS: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x68, 0xEE, 0x3C, 0x80];
const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0xB8, 0x00, 0x04, 0x11];
const P_SLICE: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x41, 0xE2, 0x20, 0x07];
const ADTS: &[u8] = &[0xFF, 0xF1, 0x50, 0x80, 0x01, 0x1F, 0xFC, 0xDE, 0x04];

fn mux_program(config: PsMuxerConfig) -> Vec<u8> {
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&output);
    let mut muxer = PsMuxer::with_config(config);
    muxer.set_on_packet(move |pack| sink.borrow_mut().extend_from_slice(pack));
    let video = muxer.add_stream(PsStreamType::H264).unwrap();
    let audio = muxer.add_stream(PsStreamType::Aac).unwrap();

    muxer.write(video, &[SPS, PPS, IDR].concat(), 0, 0).unwrap();
    muxer.write(audio, ADTS, 0, 0).unwrap();
    muxer.write(video, P_SLICE, 40, 40).unwrap();
    muxer.write(audio, ADTS, 21, 21).unwrap();
    muxer.write(video, P_SLICE, 80, 80).unwrap();
    output.take()
}

fn frame_sink(demuxer: &mut PsDemuxer) -> Rc<RefCell<Vec<DemuxedFrame>>> {
    let frames = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&frames);
    demuxer.set_on_frame(move |f| sink.borrow_mut().push(f));
    frames
}

fn summarize(frames: &[DemuxedFrame]) -> Vec<(CodecId, u64, usize)> {
    frames.iter().map(|f| (f.codec, f.pts_ms, f.data.len())).collect()
}

/// 测试日志输出到 cargo test 的捕获缓冲
fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_program_round_trip() {
    init_log();
    let ps = mux_program(PsMuxerConfig::default());
    let mut demuxer = PsDemuxer::new();
    let frames = frame_sink(&mut demuxer);
    demuxer.input(&ps).unwrap();
    demuxer.flush();

    assert_eq!(
        demuxer.streams(),
        vec![(0xC0, CodecId::Aac), (0xE0, CodecId::H264)]
    );
    let frames = frames.borrow();
    let video: Vec<_> = frames.iter().filter(|f| f.codec == CodecId::H264).collect();
    let audio: Vec<_> = frames.iter().filter(|f| f.codec == CodecId::Aac).collect();
    assert_eq!(video.len(), 5);
    assert_eq!(&video[2].data[..], IDR);
    assert_eq!(video[3].pts_ms, 40);
    assert_eq!(video[4].pts_ms, 80);
    assert_eq!(audio.len(), 2);
    assert!(audio.iter().all(|f| &f.data[..] == ADTS));
    assert_eq!(audio[1].pts_ms, 21);
}

#[test]
fn test_chunked_input_matches_whole() {
    init_log();
    let ps = mux_program(PsMuxerConfig::default());

    let mut whole = PsDemuxer::new();
    let whole_frames = frame_sink(&mut whole);
    whole.input(&ps).unwrap();
    whole.flush();

    for chunk_size in [1, 7, 64, 500] {
        let mut chunked = PsDemuxer::new();
        let frames = frame_sink(&mut chunked);
        for chunk in ps.chunks(chunk_size) {
            match chunked.input(chunk) {
                Ok(()) | Err(LiuError::NeedMore) => {}
                Err(e) => panic!("chunk_size={chunk_size} 意外错误: {e}"),
            }
        }
        assert_eq!(chunked.cached_len(), 0);
        chunked.flush();
        assert_eq!(
            summarize(&frames.borrow()),
            summarize(&whole_frames.borrow()),
            "chunk_size={chunk_size}"
        );
    }
}

#[test]
fn test_file_input_matches_memory() {
    init_log();
    let ps = mux_program(PsMuxerConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program.ps");
    std::fs::write(&path, &ps).unwrap();

    let mut from_file = PsDemuxer::new();
    let file_frames = frame_sink(&mut from_file);
    from_file
        .input_from(&mut IoContext::open_read(&path).unwrap())
        .unwrap();

    let mut from_memory = PsDemuxer::new();
    let memory_frames = frame_sink(&mut from_memory);
    from_memory.input(&ps).unwrap();
    from_memory.flush();

    assert_eq!(file_frames.borrow().len(), 7);
    assert_eq!(
        summarize(&file_frames.borrow()),
        summarize(&memory_frames.borrow())
    );
    assert_eq!(from_file.streams(), from_memory.streams());
}

#[test]
fn test_records_and_padding() {
    init_log();
    let config = PsMuxerConfig {
        mux_rate: 8000,
        ..PsMuxerConfig::default()
    };
    let mut ps = mux_program(config);
    // 填充流与结束码都应被跳过
    ps.extend_from_slice(&[0x00, 0x00, 0x01, 0xBE, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF]);
    ps.extend_from_slice(&[0x00, 0x00, 0x01, 0xB9]);

    let mut demuxer = PsDemuxer::new();
    let records = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&records);
    demuxer.set_on_record(move |kind, result| {
        let record = result.expect("记录解码失败").clone();
        sink.borrow_mut().push((kind, record));
    });
    demuxer.input(&ps).unwrap();

    let records = records.borrow();
    let packs: Vec<&PackHeader> = records
        .iter()
        .filter_map(|(_, r)| match r {
            PsRecord::PackHeader(h) => Some(h),
            _ => None,
        })
        .collect();
    assert_eq!(packs.len(), 5);
    assert!(packs.iter().all(|h| h.mux_rate == 8000 && !h.is_mpeg1));
    assert_eq!(packs[2].scr_base, 40 * 90);

    // 关键帧正好是第一次写入, 之后的 pack 不再带 PSM
    let maps = records
        .iter()
        .filter(|(kind, _)| *kind == PsRecordKind::StreamMap)
        .count();
    assert_eq!(maps, 1);

    let (kind, last) = &records[records.len() - 1];
    assert_eq!(*kind, PsRecordKind::GenericPes);
    match last {
        PsRecord::GenericPes(skipped) => {
            assert_eq!(skipped.stream_id, 0xBE);
            assert_eq!(skipped.length, 4);
        }
        other => panic!("应为填充流: {other:?}"),
    }
    assert_eq!(demuxer.cached_len(), 0);
}

#[test]
fn test_mpeg1_audio_guessed_as_aac() {
    init_log();
    let mut bw = BitWriter::new();
    for (pts, fill) in [(9000u64, 0x11u8), (10890, 0x22)] {
        PackHeader {
            is_mpeg1: true,
            scr_base: pts,
            mux_rate: 2000,
            ..PackHeader::default()
        }
        .encode(&mut bw)
        .unwrap();
        let payload = [fill; 32];
        bw.write_bytes(&[0x00, 0x00, 0x01, 0xC0]).unwrap();
        bw.write_bits((5 + payload.len()) as u32, 16);
        write_timestamp(&mut bw, 0b0010, pts);
        bw.write_bytes(&payload).unwrap();
    }

    let mut demuxer = PsDemuxer::new();
    let frames = frame_sink(&mut demuxer);
    demuxer.input(&bw.finish()).unwrap();
    assert!(demuxer.is_mpeg1());
    demuxer.flush();

    assert_eq!(demuxer.streams(), vec![(0xC0, CodecId::Aac)]);
    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].pts_ms, frames[0].data[0]), (100, 0x11));
    assert_eq!((frames[1].pts_ms, frames[1].data[0]), (121, 0x22));
}
