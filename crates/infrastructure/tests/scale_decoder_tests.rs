use domain::{ScaleProtocol, WeightUnit};
use infrastructure::ScaleDecoder;

#[test] // decodes_toledo_status_frame
fn decodes_toledo_status_frame() {
    let decoder = ScaleDecoder::new();
    let reading = decoder
        .decode(b"ST,GS,+00001.234kg", ScaleProtocol::Toledo)
        .expect("Should decode");
    assert_eq!(reading.weight, 1.234);
    assert_eq!(reading.unit, WeightUnit::Kg);
    assert!(reading.stable);
}

#[test] // decodes_urano_grams_without_marker
fn decodes_urano_grams_without_marker() {
    let decoder = ScaleDecoder::new();
    let reading = decoder
        .decode(b"+00000500g", ScaleProtocol::Urano)
        .expect("Should decode");
    assert_eq!(reading.weight, 500.0);
    assert_eq!(reading.unit, WeightUnit::G);
    assert!(reading.stable);
}

#[test] // unstable_marker_clears_stable_flag
fn unstable_marker_clears_stable_flag() {
    let decoder = ScaleDecoder::new();
    for raw in ["US,GS,+0.850kg", "UT,NS,  0.850kg", "us,gs,0.850kg"] {
        let reading = decoder.decode_str(raw, ScaleProtocol::Toledo).expect(raw);
        assert_eq!(reading.weight, 0.85);
        assert!(!reading.stable, "{} should be unstable", raw);
    }
}

#[test] // decodes_filizola_weigh_prefix
fn decodes_filizola_weigh_prefix() {
    let decoder = ScaleDecoder::new();
    let reading = decoder
        .decode_str("W +1.250 lb\r\n", ScaleProtocol::Filizola)
        .expect("Should decode");
    assert_eq!(reading.weight, 1.25);
    assert_eq!(reading.unit, WeightUnit::Lb);
}

#[test] // filizola_ignores_status_pairs
fn filizola_ignores_status_pairs() {
    let decoder = ScaleDecoder::new();
    assert!(decoder.decode_str("ST,GS,+1.000kg", ScaleProtocol::Filizola).is_none());
    assert!(decoder.decode_str("ST,GS,+1.000kg", ScaleProtocol::Generic).is_some());
}

#[test] // numeric_only_defaults_to_stable_kilograms
fn numeric_only_defaults_to_stable_kilograms() {
    let decoder = ScaleDecoder::new();
    let reading = decoder
        .decode(b"\x02001.250\x03", ScaleProtocol::Generic)
        .expect("Should decode");
    assert_eq!(reading.weight, 1.25);
    assert_eq!(reading.unit, WeightUnit::Kg);
    assert!(reading.stable);
}

#[test] // accepts_comma_decimal_separator
fn accepts_comma_decimal_separator() {
    let decoder = ScaleDecoder::new();
    let reading = decoder.decode_str("5,30 kg", ScaleProtocol::Generic).unwrap();
    assert_eq!(reading.weight, 5.3);
}

#[test] // spaces_between_value_and_unit
fn spaces_between_value_and_unit() {
    let decoder = ScaleDecoder::new();
    let reading = decoder.decode_str("   0.532   g  ", ScaleProtocol::Urano).unwrap();
    assert_eq!(reading.weight, 0.532);
    assert_eq!(reading.unit, WeightUnit::G);
}

#[test] // negative_samples_are_not_weighings
fn negative_samples_are_not_weighings() {
    let decoder = ScaleDecoder::new();
    assert!(decoder.decode_str("-12.45 kg", ScaleProtocol::Generic).is_none());
    assert!(decoder.decode_str("ST,GS,-0.100kg", ScaleProtocol::Toledo).is_none());

    let zero = decoder.decode_str("-0.000kg", ScaleProtocol::Generic).unwrap();
    assert_eq!(zero.weight, 0.0);
}

#[test] // garbage_yields_none
fn garbage_yields_none() {
    let decoder = ScaleDecoder::new();
    let samples: [&[u8]; 6] = [
        b"",
        b"\r\n",
        &[0xFF, 0xFE, 0x00, 0x13],
        b"ST,GS,",
        b"kg",
        b"12.3.4kg",
    ];
    for protocol in ScaleProtocol::ALL {
        for raw in samples {
            assert!(decoder.decode(raw, protocol).is_none(), "{:?} under {}", raw, protocol);
        }
    }
}

#[test] // partial_frame_after_complete_one
fn partial_frame_after_complete_one() {
    let decoder = ScaleDecoder::new();
    let reading = decoder
        .decode(b"ST,GS,+00002.000kg\r\nST,GS,+000", ScaleProtocol::Toledo)
        .expect("Should fall back to the complete frame");
    assert_eq!(reading.weight, 2.0);
}
