use byteorder::{LittleEndian, WriteBytesExt};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solidarc::block::decompress_block;
use solidarc::codec::{Codec, StageContext, ZstdCodec};
use solidarc::folder::{decode_folder, DecodeContext};
use solidarc::index::{Coder, Folder, FolderId};
use solidarc::superblock::{Superblock, SUPERBLOCK_SIZE};
use solidarc::{CodecId, MemoryStore, ReadStatus, ReaderOptions, SolidReader};

fn sample_data() -> Vec<u8> {
    b"solid archives pack many small files into one compressed folder. "
        .iter()
        .cycle()
        .take(1024 * 1024)
        .copied()
        .collect()
}

fn bench_block(c: &mut Criterion) {
    let data = sample_data();
    let packed = lz4_flex::block::compress(&data);
    let runs = lz4_flex::block::compress(&vec![0u8; 1024 * 1024]);

    c.bench_function("lz4_block_decode_1mb_text", |b| b.iter(|| decompress_block(black_box(&packed))));
    c.bench_function("lz4_block_decode_1mb_zeros", |b| b.iter(|| decompress_block(black_box(&runs))));
}

fn bench_codecs(c: &mut Criterion) {
    let data = sample_data();
    let packed = zstd::encode_all(&data[..], 3).unwrap();
    let ctx = StageContext::unbounded();

    c.bench_function("zstd_stage_1mb", |b| {
        b.iter(|| ZstdCodec.decompress(black_box(&packed), &[], &ctx).unwrap())
    });
}

fn bench_folder(c: &mut Criterion) {
    let data = sample_data();
    let packed = lz4_flex::block::compress(&data);
    let folder = Folder {
        id:          FolderId(0),
        pack_offset: 0,
        pack_size:   packed.len() as u64,
        unpack_size: data.len() as u64,
        crc:         Some(crc32fast::hash(&data)),
        coders:      vec![Coder::new(CodecId::Lz4, vec![])],
    };
    let ctx = DecodeContext { key: None, verify_crc: true, max_folder_size: 1 << 30 };

    c.bench_function("folder_decode_lz4_1mb_crc", |b| {
        b.iter(|| {
            let mut store = MemoryStore::from_vec(packed.clone());
            decode_folder(&mut store, black_box(&folder), &ctx).unwrap()
        })
    });
}

/// One LZ4 folder split into `count` equal entries.
fn solid_archive(data: &[u8], count: usize) -> Vec<u8> {
    let packed = lz4_flex::block::compress(data);
    let each = data.len() / count;

    let mut header = Vec::new();
    header.write_u32::<LittleEndian>(1).unwrap();
    header.write_u64::<LittleEndian>(SUPERBLOCK_SIZE as u64).unwrap();
    header.write_u64::<LittleEndian>(packed.len() as u64).unwrap();
    header.write_u64::<LittleEndian>((each * count) as u64).unwrap();
    header.write_u8(0).unwrap();
    header.write_u32::<LittleEndian>(0).unwrap();
    header.write_u8(1).unwrap();
    header.write_u8(CodecId::Lz4.id()).unwrap();
    header.write_u16::<LittleEndian>(0).unwrap();
    header.write_u32::<LittleEndian>(count as u32).unwrap();
    for i in 0..count {
        let name = format!("file_{i:04}.txt");
        header.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        header.extend_from_slice(name.as_bytes());
        header.write_u8(0b10).unwrap();
        header.write_u32::<LittleEndian>(0).unwrap();
        header.write_u64::<LittleEndian>(each as u64).unwrap();
    }

    let mut sb = Superblock::new();
    sb.header_offset = (SUPERBLOCK_SIZE + packed.len()) as u64;
    sb.header_size = header.len() as u64;
    sb.header_crc32 = crc32fast::hash(&header);
    let mut out = Vec::new();
    sb.write(&mut out).unwrap();
    out.extend_from_slice(&packed);
    out.extend_from_slice(&header);
    out
}

fn bench_forward_scan(c: &mut Criterion) {
    let archive = solid_archive(&sample_data(), 256);

    c.bench_function("navigator_forward_scan_256_entries", |b| {
        b.iter(|| {
            let store = MemoryStore::from_vec(archive.clone());
            let mut reader = SolidReader::open(store, ReaderOptions::default()).unwrap();
            let mut buf = [0u8; 4096];
            let mut total = 0usize;
            while reader.next_entry().unwrap().is_some() {
                while let ReadStatus::Read(n) = reader.read(&mut buf).unwrap() {
                    total += n;
                }
            }
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_block, bench_codecs, bench_folder, bench_forward_scan);
criterion_main!(benches);
