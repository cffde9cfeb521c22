//! Property-based tests for the PCM16 transport codec and frame chunking.
//!
//! *For any* sample sequence in [-1, 1], encoding then decoding yields the
//! same number of samples, each within one quantization step of the input.

use fala_realtime::{FrameChunker, VoiceError, decode, decode_base64, encode};
use proptest::prelude::*;

const STEP: f32 = 1.0 / 32768.0;

fn arb_samples() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..=1.0, 0..2048)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Decoded samples stay within one quantization step of the source.
    #[test]
    fn prop_codec_is_lossless_within_one_step(samples in arb_samples()) {
        let blob = encode(&samples, 16_000);
        prop_assert_eq!(blob.mime_type.as_str(), "audio/pcm;rate=16000");

        let buffer = decode_base64(&blob.data, 16_000, 1).unwrap();
        let decoded = buffer.channel(0).unwrap();
        prop_assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded) {
            prop_assert!(
                (original - restored).abs() <= STEP,
                "sample {} decoded as {}",
                original,
                restored
            );
        }
    }

    /// Out-of-range samples clamp to full scale instead of wrapping.
    #[test]
    fn prop_encode_clamps_out_of_range(sample in prop_oneof![1.0f32..100.0, -100.0f32..-1.0]) {
        let blob = encode(&[sample], 24_000);
        let buffer = decode_base64(&blob.data, 24_000, 1).unwrap();
        let restored = buffer.channel(0).unwrap()[0];
        prop_assert_eq!(restored.signum(), sample.signum());
        prop_assert!(restored.abs() >= 1.0 - STEP);
    }

    /// Any odd-length payload is rejected whole.
    #[test]
    fn prop_odd_length_payloads_are_rejected(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut bytes = bytes;
        if bytes.len() % 2 == 0 {
            bytes.push(0);
        }
        let result = decode(&bytes, 24_000, 1);
        prop_assert!(matches!(result, Err(VoiceError::DecodingError(_))));
    }

    /// Chunking delivers every sample exactly once, in order.
    #[test]
    fn prop_chunker_preserves_samples(
        pushes in prop::collection::vec(prop::collection::vec(-1.0f32..=1.0, 0..300), 0..20),
        frame_len in 1usize..512,
    ) {
        let mut chunker = FrameChunker::new(frame_len);
        let mut out = Vec::new();
        for push in &pushes {
            for frame in chunker.push(push) {
                prop_assert_eq!(frame.len(), frame_len);
                out.extend(frame);
            }
        }
        if let Some(rest) = chunker.flush_remaining() {
            prop_assert!(rest.len() < frame_len);
            out.extend(rest);
        }
        let expected: Vec<f32> = pushes.into_iter().flatten().collect();
        prop_assert_eq!(out, expected);
    }
}
