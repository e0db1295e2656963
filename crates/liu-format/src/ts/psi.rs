//! PSI 表: PAT (Program Association Table) 与 PMT (Program Map Table).
//!
//! 长段格式:
//! ```text
//! table_id 8 | syntax 1 | '0' 1 | reserved 2 | section_length 12
//! table_id_extension 16 | reserved 2 | version 5 | current_next 1
//! section_number 8 | last_section_number 8
//! [表内容]
//! CRC_32 32 (大端, 覆盖 table_id 到表内容末尾)
//! ```

use liu_core::crc::crc32_mpeg2;
use liu_core::{BitReader, BitWriter, LiuError, LiuResult};

/// program_association_section
pub const TABLE_ID_PAT: u8 = 0x00;
/// TS_program_map_section
pub const TABLE_ID_PMT: u8 = 0x02;

/// section_length 上限
const MAX_SECTION_LENGTH: usize = 1021;
/// section_length 中固定部分 (table_id_extension 到 last_section_number) 与 CRC 的长度
const SECTION_OVERHEAD: usize = 5 + 4;

/// 段头中 table_id_extension 之后的公共字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// table_id
    pub table_id: u8,
    /// transport_stream_id (PAT) 或 program_number (PMT)
    pub table_id_extension: u16,
    /// version_number
    pub version: u8,
    /// current_next_indicator
    pub current_next: bool,
    /// section_number
    pub section_number: u8,
    /// last_section_number
    pub last_section_number: u8,
}

impl SectionHeader {
    fn new(table_id: u8, table_id_extension: u16, version: u8) -> Self {
        Self {
            table_id,
            table_id_extension,
            version,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
        }
    }
}

/// 写入一个完整的长段, `body` 负责写表内容
fn encode_section<F>(bw: &mut BitWriter, header: &SectionHeader, body: F) -> LiuResult<()>
where
    F: FnOnce(&mut BitWriter),
{
    let start = bw.byte_offset();
    bw.write_bits(u32::from(header.table_id), 8);
    let length_loc = bw.byte_offset();
    bw.write_bits(0, 16);
    bw.mark();
    bw.write_bits(u32::from(header.table_id_extension), 16);
    bw.write_bits(0b11, 2);
    bw.write_bits(u32::from(header.version), 5);
    bw.write_flag(header.current_next);
    bw.write_bits(u32::from(header.section_number), 8);
    bw.write_bits(u32::from(header.last_section_number), 8);
    body(bw);

    let section_length = bw.distance_from_mark() / 8 + 4;
    if section_length > MAX_SECTION_LENGTH {
        return Err(LiuError::InvalidArgument(format!(
            "PSI: 段长度超出上限, section_length={}",
            section_length
        )));
    }
    // section_syntax_indicator=1, '0', reserved='11'
    bw.set_u16_at(length_loc, 0xB000 | section_length as u16)?;
    let crc = crc32_mpeg2(&bw.data()[start..]);
    bw.write_bits(crc, 32);
    Ok(())
}

/// 校验并拆分一个长段, 返回段头与表内容
fn decode_section(data: &[u8], expect_table_id: u8) -> LiuResult<(SectionHeader, &[u8])> {
    if data.len() < 3 {
        return Err(LiuError::Malformed(format!(
            "PSI: 数据不足以容纳段头, len={}",
            data.len()
        )));
    }
    if data[0] != expect_table_id {
        return Err(LiuError::Malformed(format!(
            "PSI: table_id 不匹配, expect={:#04x}, actual={:#04x}",
            expect_table_id, data[0]
        )));
    }
    let section_length = (usize::from(data[1] & 0x0F) << 8) | usize::from(data[2]);
    if !(SECTION_OVERHEAD..=MAX_SECTION_LENGTH).contains(&section_length) {
        return Err(LiuError::Malformed(format!(
            "PSI: section_length 非法, section_length={}",
            section_length
        )));
    }
    if data.len() < 3 + section_length {
        return Err(LiuError::Malformed(format!(
            "PSI: 段长度超出数据长度, section_length={}, remain={}",
            section_length,
            data.len() - 3
        )));
    }
    let section = &data[..3 + section_length];
    if crc32_mpeg2(section) != 0 {
        return Err(LiuError::Malformed(format!(
            "PSI: CRC 校验失败, table_id={:#04x}",
            expect_table_id
        )));
    }

    let mut br = BitReader::new(&section[3..8]);
    let table_id_extension = br.read_bits(16)? as u16;
    br.skip_bits(2)?;
    let header = SectionHeader {
        table_id: data[0],
        table_id_extension,
        version: br.read_bits(5)? as u8,
        current_next: br.read_flag()?,
        section_number: br.read_bits(8)? as u8,
        last_section_number: br.read_bits(8)? as u8,
    };
    Ok((header, &section[8..section.len() - 4]))
}

/// PAT 条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    /// program_number, 0 表示网络 PID
    pub program_number: u16,
    /// PMT PID (或 network_PID)
    pub pid: u16,
}

/// PAT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    /// 段头
    pub header: SectionHeader,
    /// 节目列表
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// 创建空 PAT
    pub fn new(transport_stream_id: u16, version: u8) -> Self {
        Self {
            header: SectionHeader::new(TABLE_ID_PAT, transport_stream_id, version),
            programs: Vec::new(),
        }
    }

    /// 所有 PMT PID (跳过 program_number 为 0 的网络 PID)
    pub fn pmt_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.programs
            .iter()
            .filter(|p| p.program_number != 0)
            .map(|p| p.pid)
    }

    /// 编码为段 (含 CRC)
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        encode_section(bw, &self.header, |bw| {
            for program in &self.programs {
                bw.write_bits(u32::from(program.program_number), 16);
                bw.write_bits(0b111, 3);
                bw.write_bits(u32::from(program.pid), 13);
            }
        })
    }

    /// 从段数据解码 (不含 pointer_field)
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        let (header, body) = decode_section(data, TABLE_ID_PAT)?;
        if body.len() % 4 != 0 {
            return Err(LiuError::Malformed(format!(
                "PAT: 节目条目长度不是 4 的倍数, len={}",
                body.len()
            )));
        }
        let mut br = BitReader::new(body);
        let mut programs = Vec::with_capacity(body.len() / 4);
        while !br.is_eof() {
            let program_number = br.read_bits(16)? as u16;
            br.skip_bits(3)?;
            let pid = br.read_bits(13)? as u16;
            programs.push(PatProgram {
                program_number,
                pid,
            });
        }
        Ok(Self { header, programs })
    }
}

/// PMT 中的基本流条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    /// stream_type
    pub stream_type: u8,
    /// elementary_PID
    pub elementary_pid: u16,
    /// ES_info_length (描述符被跳过)
    pub es_info_length: u16,
}

/// PMT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    /// 段头
    pub header: SectionHeader,
    /// PCR_PID
    pub pcr_pid: u16,
    /// program_info_length (描述符被跳过)
    pub program_info_length: u16,
    /// 基本流列表
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// 创建空 PMT
    pub fn new(program_number: u16, version: u8, pcr_pid: u16) -> Self {
        Self {
            header: SectionHeader::new(TABLE_ID_PMT, program_number, version),
            pcr_pid,
            program_info_length: 0,
            streams: Vec::new(),
        }
    }

    /// program_number
    pub fn program_number(&self) -> u16 {
        self.header.table_id_extension
    }

    /// 编码为段 (含 CRC), 不写描述符
    pub fn encode(&self, bw: &mut BitWriter) -> LiuResult<()> {
        encode_section(bw, &self.header, |bw| {
            bw.write_bits(0b111, 3);
            bw.write_bits(u32::from(self.pcr_pid), 13);
            bw.write_bits(0xF, 4);
            bw.write_bits(0, 12);
            for stream in &self.streams {
                bw.write_bits(u32::from(stream.stream_type), 8);
                bw.write_bits(0b111, 3);
                bw.write_bits(u32::from(stream.elementary_pid), 13);
                bw.write_bits(0xF, 4);
                bw.write_bits(0, 12);
            }
        })
    }

    /// 从段数据解码 (不含 pointer_field)
    pub fn decode(data: &[u8]) -> LiuResult<Self> {
        let (header, body) = decode_section(data, TABLE_ID_PMT)?;
        let mut br = BitReader::new(body);
        if br.bytes_left() < 4 {
            return Err(LiuError::Malformed(format!(
                "PMT: 表内容过短, len={}",
                body.len()
            )));
        }
        br.skip_bits(3)?;
        let pcr_pid = br.read_bits(13)? as u16;
        br.skip_bits(4)?;
        let program_info_length = br.read_bits(12)? as u16;
        skip_descriptors(&mut br, program_info_length, "program_info_length")?;

        let mut streams = Vec::new();
        while br.bytes_left() >= 5 {
            let stream_type = br.read_bits(8)? as u8;
            br.skip_bits(3)?;
            let elementary_pid = br.read_bits(13)? as u16;
            br.skip_bits(4)?;
            let es_info_length = br.read_bits(12)? as u16;
            skip_descriptors(&mut br, es_info_length, "ES_info_length")?;
            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                es_info_length,
            });
        }
        if !br.is_eof() {
            return Err(LiuError::Malformed(format!(
                "PMT: 流条目末尾残留 {} 字节",
                br.bytes_left()
            )));
        }

        Ok(Self {
            header,
            pcr_pid,
            program_info_length,
            streams,
        })
    }
}

fn skip_descriptors(br: &mut BitReader, len: u16, what: &str) -> LiuResult<()> {
    let len = usize::from(len);
    if br.bytes_left() < len {
        return Err(LiuError::Malformed(format!(
            "PMT: {} 超出段长度, len={}, remain={}",
            what,
            len,
            br.bytes_left()
        )));
    }
    br.skip_bytes(len)
}
