//! ZERO-RUN spectrum compression.
//!
//! Non-zero counts are copied verbatim. Every run of zeros becomes the pair
//! `(0, run_length)`. Unlike classic RLE, runs of non-zero values are never
//! collapsed, which suits XRF spectra: long empty tails, busy peak regions.

use super::CodecError;

/// Compress a spectrum
pub fn encode(data: &[i64]) -> Vec<i64> {
    let mut result = Vec::with_capacity(data.len());
    let mut zero_run: i64 = 0;

    for &value in data {
        if value == 0 {
            zero_run += 1;
            continue;
        }
        if zero_run > 0 {
            result.extend([0, zero_run]);
            zero_run = 0;
        }
        result.push(value);
    }
    if zero_run > 0 {
        result.extend([0, zero_run]);
    }

    result
}

/// Expand a compressed spectrum
pub fn decode(data: &[i64]) -> Result<Vec<i64>, CodecError> {
    let mut result = Vec::with_capacity(data.len());
    let mut iter = data.iter().copied().enumerate();

    while let Some((idx, value)) = iter.next() {
        if value != 0 {
            result.push(value);
            continue;
        }
        match iter.next() {
            Some((_, run)) if run > 0 => {
                result.resize(result.len() + run as usize, 0);
            }
            Some((_, run)) => return Err(CodecError::InvalidZeroRun { index: idx, run }),
            None => return Err(CodecError::TruncatedZeroRun(idx)),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_runs() {
        assert_eq!(
            encode(&[0, 0, 4, 2, 0, 0, 0, 0, 3, 0]),
            vec![0, 2, 4, 2, 0, 4, 3, 0, 1]
        );
    }

    #[test]
    fn test_decode_runs() {
        assert_eq!(
            decode(&[0, 2, 4, 2, 0, 4, 3, 0, 1]).unwrap(),
            vec![0, 0, 4, 2, 0, 0, 0, 0, 3, 0]
        );
    }

    #[test]
    fn test_empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_no_zeros_is_identity() {
        assert_eq!(encode(&[5, 1, 9]), vec![5, 1, 9]);
    }

    #[test]
    fn test_trailing_lone_zero_rejected() {
        assert!(matches!(
            decode(&[3, 0]),
            Err(CodecError::TruncatedZeroRun(1))
        ));
    }

    #[test]
    fn test_non_positive_run_rejected() {
        assert!(matches!(
            decode(&[0, 0]),
            Err(CodecError::InvalidZeroRun { index: 0, run: 0 })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in prop::collection::vec(prop_oneof![Just(0i64), 1i64..5000], 0..256)) {
            let encoded = encode(&data);
            prop_assert!(encoded.len() <= data.len() * 2);
            prop_assert_eq!(decode(&encoded).unwrap(), data);
        }
    }
}
