//! Integration tests for coilcast-common library.

use coilcast_common::{
    CoilBank, SIN_COUNT, SIN_OFFSET, SamplePair, TIME_COUNT, TIME_OFFSET, decode_f32, decode_f64,
    encode_f32, encode_f64,
};

#[test]
fn test_publish_read_decode_workflow() {
    let bank = CoilBank::new();
    let epoch_time = 1_700_000_000.5;
    let sample = SamplePair::at(epoch_time);

    bank.publish(&sample);

    // A client reads the two fixed regions separately
    let time_bits = bank.read(TIME_OFFSET, TIME_COUNT).expect("time region");
    let sin_bits = bank.read(SIN_OFFSET, SIN_COUNT).expect("sin region");
    assert_eq!(time_bits.len(), 64);
    assert_eq!(sin_bits.len(), 32);

    let decoded = SamplePair::from_coils(&time_bits, &sin_bits).expect("decode failed");
    assert_eq!(decoded.epoch_time, epoch_time);
    assert_eq!(decoded.sin_value, epoch_time.sin() as f32);
}

#[test]
fn test_bank_contents_match_codec() {
    let bank = CoilBank::new();
    let sample = SamplePair {
        epoch_time: -1.25,
        sin_value: 0.75,
    };

    bank.publish(&sample);

    assert_eq!(
        bank.read(TIME_OFFSET, TIME_COUNT).unwrap(),
        encode_f64(-1.25).to_vec()
    );
    assert_eq!(
        bank.read(SIN_OFFSET, SIN_COUNT).unwrap(),
        encode_f32(0.75).to_vec()
    );
}

#[test]
fn test_full_bank_read_spans_both_regions() {
    let bank = CoilBank::new();
    bank.publish(&SamplePair::at(12345.678));

    let all = bank.read(0, 96).unwrap();
    let time_bits: [bool; 64] = all[..64].try_into().unwrap();
    let sin_bits: [bool; 32] = all[64..].try_into().unwrap();

    assert_eq!(decode_f64(&time_bits), 12345.678);
    assert_eq!(decode_f32(&sin_bits), 12345.678f64.sin() as f32);
}

#[test]
fn test_concurrent_readers_never_see_torn_pairs() {
    let bank = CoilBank::new();
    bank.publish(&SamplePair::at(0.0));

    let writer = {
        let bank = bank.clone();
        std::thread::spawn(move || {
            for i in 1..2000 {
                bank.publish(&SamplePair::at(i as f64));
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let bank = bank.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let all = bank.read(0, 96).unwrap();
                    let pair = SamplePair::from_coils(&all[..64], &all[64..]).unwrap();
                    assert_eq!(pair.sin_value, pair.epoch_time.sin() as f32);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
