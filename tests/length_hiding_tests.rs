use pretty_assertions::assert_eq;
use tls_record::crypto::CipherType;
use tls_record::range::{max_lh_pad, split_range};
use tls_record::{
    BulkCipherAlgorithm, ContentType, Error, MacAlgorithm, MemoryTransport, PaddingProfile,
    ProtocolVersion, Range, ReadMode, SecurityParameters, Session, SessionConfig, Transport,
};

fn sender(
    config: SessionConfig,
    suite: Option<(BulkCipherAlgorithm, MacAlgorithm)>,
    version: ProtocolVersion,
) -> (Session<MemoryTransport>, MemoryTransport) {
    tls_record::init_logging();
    let (a, b) = MemoryTransport::pair();
    let mut session = Session::new(config, a).unwrap();
    session.set_version(version).unwrap();

    if let Some((cipher, mac)) = suite {
        let params = SecurityParameters::new(cipher, mac, vec![0x42u8; 48], [7u8; 32], [8u8; 32]);
        session.set_security_parameters(params).unwrap();
        session.activate_pending_write().unwrap();
    }
    (session, b)
}

// A server that reads what `sender` wrote with the same suite
fn receiver(
    config: SessionConfig,
    suite: Option<(BulkCipherAlgorithm, MacAlgorithm)>,
    version: ProtocolVersion,
    wire: MemoryTransport,
) -> Session<MemoryTransport> {
    let mut session = Session::new(config, wire).unwrap();
    session.set_version(version).unwrap();

    if let Some((cipher, mac)) = suite {
        let params = SecurityParameters::new(cipher, mac, vec![0x42u8; 48], [7u8; 32], [8u8; 32]);
        session.set_security_parameters(params).unwrap();
        session.activate_pending_read().unwrap();
    }
    session
}

fn take_wire(peer: &mut MemoryTransport) -> Vec<u8> {
    let mut raw = vec![0u8; peer.pending()];
    peer.read(&mut raw, ReadMode::Consume).unwrap();
    raw
}

fn record_lengths(raw: &[u8]) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut pos = 0;
    while pos < raw.len() {
        let len = u16::from_be_bytes([raw[pos + 3], raw[pos + 4]]) as usize;
        lengths.push(len);
        pos += 5 + len;
    }
    lengths
}

fn read_all(session: &mut Session<MemoryTransport>, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 1024];
    while out.len() < len {
        let n = session.recv(ContentType::ApplicationData, &mut buf).unwrap();
        out.extend_from_slice(&buf[..n]);
    }
    out
}

const CBC: Option<(BulkCipherAlgorithm, MacAlgorithm)> =
    Some((BulkCipherAlgorithm::Aes128Cbc, MacAlgorithm::Sha1));

#[test]
fn test_capability_by_cipher_and_version() {
    let (plain, _) = sender(SessionConfig::client(), None, ProtocolVersion::TLS10);
    assert!(!plain.can_use_length_hiding());

    let (cbc, _) = sender(SessionConfig::client(), CBC, ProtocolVersion::TLS10);
    assert!(cbc.can_use_length_hiding());

    let (legacy, _) = sender(SessionConfig::client(), CBC, ProtocolVersion::SSL3);
    assert!(!legacy.can_use_length_hiding());

    let config = SessionConfig::client().with_extra_padding(true);
    let (extension, _) = sender(config, None, ProtocolVersion::SSL3);
    assert!(extension.can_use_length_hiding());
}

#[test]
fn test_invalid_ranges_perform_no_io() {
    let (mut session, peer) = sender(SessionConfig::client(), CBC, ProtocolVersion::TLS10);
    let data = [0u8; 50];

    for range in [Range::new(60, 40), Range::new(51, 100), Range::new(0, 49)] {
        assert!(matches!(session.send_range(&data, range), Err(Error::InvalidRequest(_))));
    }
    assert_eq!(peer.pending(), 0);
    assert_eq!(session.write_sequence_number(), 0);
    assert!(session.is_valid());
}

#[test]
fn test_range_refused_without_capability() {
    let (mut session, peer) = sender(SessionConfig::client(), None, ProtocolVersion::TLS10);
    assert!(matches!(
        session.send_range(b"hello", Range::new(0, 100)),
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(peer.pending(), 0);

    // An exact range needs no padding
    assert_eq!(session.send_range(b"hello", Range::exact(5)).unwrap(), 5);
    assert!(peer.pending() > 0);
}

#[test]
fn test_exact_range_round_trip() {
    let (mut session, mut wire) = sender(SessionConfig::client(), CBC, ProtocolVersion::TLS11);
    let data: Vec<u8> = (0..40000u32).map(|i| (i * 7) as u8).collect();

    assert_eq!(session.send_range(&data, Range::exact(data.len())).unwrap(), data.len());
    assert_eq!(session.write_sequence_number(), 3);

    let raw = take_wire(&mut wire);
    assert_eq!(record_lengths(&raw).len(), 3);
    wire.inject(&raw).unwrap();

    let mut server = receiver(SessionConfig::server(), CBC, ProtocolVersion::TLS11, wire);
    assert_eq!(read_all(&mut server, data.len()), data);
}

#[test]
fn test_record_sizes_do_not_reveal_length() {
    let range = Range::new(5, 300);
    let mut observed = Vec::new();

    for len in [5usize, 10, 151, 290, 300] {
        let (mut session, mut wire) = sender(SessionConfig::client(), CBC, ProtocolVersion::TLS10);
        let data = vec![0x61u8; len];

        assert_eq!(session.send_range(&data, range).unwrap(), len);

        let raw = take_wire(&mut wire);
        observed.push(record_lengths(&raw));
        wire.inject(&raw).unwrap();

        let mut server = receiver(SessionConfig::server(), CBC, ProtocolVersion::TLS10, wire);
        assert_eq!(read_all(&mut server, len), data);
    }

    // [5, 251] then [0, 49]: 251 + 20 + 1 = 272 and 49 + 20 + 1 rounded up to 80
    for lengths in &observed {
        assert_eq!(lengths, &vec![272, 80]);
    }
}

#[test]
fn test_wide_range_spans_many_records() {
    let range = Range::new(0, 20000);
    let data = vec![0x7fu8; 1234];

    let (mut session, mut wire) = sender(SessionConfig::client(), CBC, ProtocolVersion::TLS12);
    assert_eq!(session.send_range(&data, range).unwrap(), data.len());

    let raw = take_wire(&mut wire);
    let lengths = record_lengths(&raw);
    assert!(lengths.len() > 1);
    // Every TLS 1.2 CBC record: IV block plus whole blocks
    assert!(lengths.iter().all(|len| len % 16 == 0 && *len >= 32));
    wire.inject(&raw).unwrap();

    let mut server = receiver(SessionConfig::server(), CBC, ProtocolVersion::TLS12, wire);
    assert_eq!(read_all(&mut server, data.len()), data);
}

#[test]
fn test_extra_padding_extension_round_trip() {
    for suite in [None, CBC] {
        let config = SessionConfig::client().with_extra_padding(true);
        let (mut session, mut wire) = sender(config, suite, ProtocolVersion::TLS10);

        let data = b"short secret".to_vec();
        let range = Range::new(0, 4000);
        assert_eq!(session.send_range(&data, range).unwrap(), data.len());

        let raw = take_wire(&mut wire);
        // The whole range fits in one padded record
        assert_eq!(record_lengths(&raw).len(), 1);
        wire.inject(&raw).unwrap();

        let config = SessionConfig::server().with_extra_padding(true);
        let mut server = receiver(config, suite, ProtocolVersion::TLS10, wire);
        assert_eq!(read_all(&mut server, data.len()), data);
    }
}

#[test]
fn test_uncapped_pads_are_block_aligned() {
    let profile = PaddingProfile {
        cipher_type: CipherType::Block,
        block_size: 16,
        tag_len: 20,
        extra_padding: false,
    };

    for data_len in 0..2000 {
        let pad = max_lh_pad(&profile, data_len, 16384);
        assert!(pad > 0);
        assert_eq!((data_len + pad + 20 + 1) % 16, 0, "data length {}", data_len);
    }
}

#[test]
fn test_split_sequence_for_wide_range() {
    let profile = PaddingProfile {
        cipher_type: CipherType::Block,
        block_size: 16,
        tag_len: 20,
        extra_padding: false,
    };

    let mut current = Range::new(100, 1000);
    let mut records = Vec::new();
    while current.high != 0 {
        let (record, next) = split_range(&profile, current, 16384);
        records.push(record);
        current = next;
    }

    assert_eq!(
        records,
        vec![Range::new(100, 347), Range::new(0, 251), Range::new(0, 251), Range::new(0, 151)]
    );
}
