//! Handshake and payload transmission over real loopback sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cosmic::net::{HandshakeError, InputBatch, InputEntry, StatePayload, generate_salt};
use cosmic::scene::spawn_player;
use cosmic::{
    ConnectionManager, ConnectionState, Cosmos, GameIntent, NetworkEndpoint, Packet,
    PacketHeader, PacketType, PlayerEntropy,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn pair() -> (NetworkEndpoint, NetworkEndpoint, SocketAddr) {
    let port = next_port();
    let server_addr = loopback(port);
    let mut server = NetworkEndpoint::bind(server_addr).unwrap();
    server.set_server_mode(true);
    let mut client = NetworkEndpoint::bind(loopback(port + 1)).unwrap();
    client.set_remote(server_addr);
    (server, client, server_addr)
}

fn wait_for_packet(endpoint: &mut NetworkEndpoint, timeout_ms: u64) -> Vec<(Packet, SocketAddr)> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let received = endpoint.receive().unwrap();
        if !received.is_empty() {
            return received;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("no packet within {timeout_ms} ms");
}

#[test]
fn handshake_hands_out_a_character() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();
    let mut connections = ConnectionManager::new(32);
    let mut cosmos = Cosmos::default();
    let client_salt = generate_salt();

    let request = client_endpoint.create_packet(PacketType::ConnectionRequest { client_salt });
    client_endpoint.send(&request).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    let (packet, from) = &received[0];
    let PacketType::ConnectionRequest { client_salt: salt } = packet.payload else {
        panic!("expected connection request, got {}", packet.payload.name());
    };
    assert_eq!(salt, client_salt);

    let client = connections.get_or_create_pending(*from, salt).unwrap();
    let challenge = PacketType::ConnectionChallenge {
        server_salt: client.server_salt,
        challenge: client.combined_salt(),
    };
    let header = PacketHeader::new(client.next_sequence(), 0, 0);
    server_endpoint
        .send_to(&Packet::new(header, challenge), *from)
        .unwrap();

    let received = wait_for_packet(&mut client_endpoint, 200);
    let PacketType::ConnectionChallenge {
        server_salt,
        challenge,
    } = received[0].0.payload
    else {
        panic!("expected challenge");
    };
    assert_eq!(challenge, client_salt ^ server_salt);

    let response = client_endpoint.create_packet(PacketType::ChallengeResponse {
        combined_salt: challenge,
    });
    client_endpoint.send(&response).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    let (packet, from) = &received[0];
    let PacketType::ChallengeResponse { combined_salt } = packet.payload else {
        panic!("expected challenge response");
    };
    let client = connections.get_by_addr_mut(from).unwrap();
    client.verify_challenge(combined_salt).unwrap();
    let character = spawn_player(&mut cosmos).unwrap();
    client.character = Some(character);

    let accepted = PacketType::ConnectionAccepted {
        client_id: client.client_id,
        character,
        steps_per_second: cosmos.clock().steps_per_second,
    };
    let header = PacketHeader::new(client.next_sequence(), 0, 0);
    server_endpoint
        .send_to(&Packet::new(header, accepted), *from)
        .unwrap();

    let received = wait_for_packet(&mut client_endpoint, 200);
    match received[0].0.payload {
        PacketType::ConnectionAccepted {
            client_id,
            character: assigned,
            steps_per_second,
        } => {
            assert!(client_id > 0);
            assert_eq!(assigned, character);
            assert_eq!(steps_per_second, 60);
        }
        ref other => panic!("expected acceptance, got {}", other.name()),
    }
    assert_eq!(connections.connected_count(), 1);
}

#[test]
fn full_server_denies_with_reason() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();
    let mut connections = ConnectionManager::new(0);

    let request = client_endpoint.create_packet(PacketType::ConnectionRequest {
        client_salt: generate_salt(),
    });
    client_endpoint.send(&request).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    let (packet, from) = &received[0];
    let PacketType::ConnectionRequest { client_salt } = packet.payload else {
        panic!("expected connection request");
    };
    let error = connections
        .get_or_create_pending(*from, client_salt)
        .unwrap_err();
    assert_eq!(error, HandshakeError::ServerFull);

    let denied = PacketType::ConnectionDenied {
        reason: error.to_string(),
    };
    server_endpoint
        .send_to(&Packet::new(PacketHeader::new(0, 0, 0), denied), *from)
        .unwrap();

    let received = wait_for_packet(&mut client_endpoint, 200);
    match &received[0].0.payload {
        PacketType::ConnectionDenied { reason } => assert!(reason.contains("full")),
        other => panic!("expected denial, got {}", other.name()),
    }
}

#[test]
fn wrong_challenge_answer_stays_pending() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();
    let mut connections = ConnectionManager::new(32);
    let client_salt = generate_salt();

    let request = client_endpoint.create_packet(PacketType::ConnectionRequest { client_salt });
    client_endpoint.send(&request).unwrap();
    let received = wait_for_packet(&mut server_endpoint, 200);
    let from = received[0].1;
    connections.get_or_create_pending(from, client_salt).unwrap();

    let response = client_endpoint.create_packet(PacketType::ChallengeResponse {
        combined_salt: 0xDEAD_BEEF,
    });
    client_endpoint.send(&response).unwrap();
    let received = wait_for_packet(&mut server_endpoint, 200);
    let PacketType::ChallengeResponse { combined_salt } = received[0].0.payload else {
        panic!("expected challenge response");
    };

    let client = connections.get_by_addr_mut(&from).unwrap();
    assert_eq!(
        client.verify_challenge(combined_salt),
        Err(HandshakeError::BadChallenge)
    );
    assert_eq!(client.state, ConnectionState::Connecting);
    assert_eq!(connections.connected_count(), 0);
}

#[test]
fn ping_echoes_timestamp() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();

    let ping = client_endpoint.create_packet(PacketType::Ping { timestamp: 12345 });
    client_endpoint.send(&ping).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    let (packet, from) = &received[0];
    let PacketType::Ping { timestamp } = packet.payload else {
        panic!("expected ping");
    };
    let pong = Packet::new(PacketHeader::new(0, 0, 0), PacketType::Pong { timestamp });
    server_endpoint.send_to(&pong, *from).unwrap();

    let received = wait_for_packet(&mut client_endpoint, 200);
    assert!(matches!(
        received[0].0.payload,
        PacketType::Pong { timestamp: 12345 }
    ));
}

#[test]
fn input_batch_arrives_in_order() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();

    let entries = (1..=3)
        .map(|sequence| {
            let mut entropy = PlayerEntropy::default();
            entropy.press(GameIntent::MoveForward);
            entropy.add_motion(sequence as i16, -2);
            InputEntry { sequence, entropy }
        })
        .collect();
    let packet = client_endpoint.create_packet(PacketType::Input(InputBatch { entries }));
    client_endpoint.send(&packet).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    let PacketType::Input(batch) = &received[0].0.payload else {
        panic!("expected input");
    };
    let sequences: Vec<u32> = batch.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, [1, 2, 3]);
    assert_eq!(batch.entries[2].entropy.motion, [3, -2]);
    assert_eq!(batch.newest_sequence(), Some(3));
}

#[test]
fn full_state_survives_the_wire() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();
    let client_addr = client_endpoint.local_addr();

    let mut cosmos = Cosmos::default();
    cosmic::scene::populate_test_scene(&mut cosmos).unwrap();
    spawn_player(&mut cosmos).unwrap();
    for _ in 0..10 {
        cosmos.advance(&Default::default());
    }

    let payload = PacketType::FullState(Box::new(StatePayload {
        acked_sequence: 7,
        cosmos: cosmos.clone(),
    }));
    server_endpoint
        .send_to(&Packet::new(PacketHeader::new(0, 0, 0), payload), client_addr)
        .unwrap();

    let received = wait_for_packet(&mut client_endpoint, 500);
    let PacketType::FullState(state) = &received[0].0.payload else {
        panic!("expected full state");
    };
    assert_eq!(state.acked_sequence, 7);
    assert_eq!(state.cosmos.step(), 10);
    assert_eq!(state.cosmos.structural_hash(), cosmos.structural_hash());
}

#[test]
fn disconnect_is_delivered() {
    let (mut server_endpoint, mut client_endpoint, _) = pair();

    let packet = client_endpoint.create_packet(PacketType::Disconnect);
    client_endpoint.send(&packet).unwrap();

    let received = wait_for_packet(&mut server_endpoint, 200);
    assert!(matches!(received[0].0.payload, PacketType::Disconnect));
}

#[test]
fn outgoing_sequences_increase() {
    let mut endpoint = NetworkEndpoint::bind(loopback(next_port())).unwrap();

    let sequences: Vec<u32> = (0..3)
        .map(|t| endpoint.create_packet(PacketType::Ping { timestamp: t }).header.sequence)
        .collect();
    assert_eq!(sequences, [0, 1, 2]);
}

#[test]
fn several_clients_get_distinct_ids() {
    let port = next_port();
    let server_addr = loopback(port);
    let mut server_endpoint = NetworkEndpoint::bind(server_addr).unwrap();
    server_endpoint.set_server_mode(true);
    let mut connections = ConnectionManager::new(32);
    let mut ids = Vec::new();

    for i in 0..3u16 {
        let mut client_endpoint = NetworkEndpoint::bind(loopback(port + 2 + i)).unwrap();
        client_endpoint.set_remote(server_addr);
        let request = client_endpoint.create_packet(PacketType::ConnectionRequest {
            client_salt: generate_salt(),
        });
        client_endpoint.send(&request).unwrap();

        let received = wait_for_packet(&mut server_endpoint, 200);
        let (packet, from) = &received[0];
        if let PacketType::ConnectionRequest { client_salt } = packet.payload {
            let client = connections.get_or_create_pending(*from, client_salt).unwrap();
            let answer = client.combined_salt();
            client.verify_challenge(answer).unwrap();
            ids.push(client.client_id);
        }
    }

    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(connections.connected_count(), 3);
}
