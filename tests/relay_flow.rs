//! End-to-end relay scenarios
//!
//! Drives the dispatcher directly for exact envelope checks, and the relay
//! task through its handle for the channel plumbing.

use suika_party_server::config::StartMode;
use suika_party_server::relay::{Envelope, SessionRelay};
use suika_party_server::ws::protocol::{
    BodyRecord, ClientMsg, ConnectionId, GameStateSnapshot, PlayerNumber, RoomId, RoomState,
    ServerMsg, SessionToken,
};
use uuid::Uuid;

fn conn() -> ConnectionId {
    Uuid::new_v4()
}

fn to(envelopes: &[Envelope], connection: ConnectionId) -> Vec<&ServerMsg> {
    envelopes
        .iter()
        .filter(|e| e.to == connection)
        .map(|e| &e.msg)
        .collect()
}

fn error_code(msg: &ServerMsg) -> Option<&str> {
    match msg {
        ServerMsg::Error { code, .. } => Some(code.as_str()),
        _ => None,
    }
}

fn snapshot(player_number: PlayerNumber, seq: u64) -> GameStateSnapshot {
    GameStateSnapshot {
        player_number,
        seq,
        score: 120,
        placement_count: 5,
        num_suika: 0,
        bodies: vec![BodyRecord {
            id: 4,
            x: 150.0,
            y: 350.0,
            angle: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            angular_velocity: 0.0,
            type_index: 2,
            radius: 30.0,
            is_sleeping: true,
        }],
        current_piece: Some(1),
        next_piece: Some(0),
        timestamp: 0,
    }
}

/// Ann hosts, Bob joins
struct Table {
    relay: SessionRelay,
    room_id: RoomId,
    ann: ConnectionId,
    bob: ConnectionId,
    bob_session: SessionToken,
}

fn table(max_players: u8) -> Table {
    let mut relay = SessionRelay::new(StartMode::Lobby, true);
    let ann = conn();
    let bob = conn();

    let out = relay.handle(
        ann,
        ClientMsg::CreateRoom {
            name: "Fruit Stand".into(),
            max_players,
            host_nickname: "Ann".into(),
        },
    );
    let room_id = match to(&out, ann).as_slice() {
        [ServerMsg::RoomCreated(entered)] => {
            assert_eq!(entered.player_number, 1);
            entered.room_id.clone()
        }
        other => panic!("unexpected {other:?}"),
    };

    let out = relay.handle(
        bob,
        ClientMsg::JoinRoom {
            room_code: room_id.to_lowercase(),
            nickname: "Bob".into(),
        },
    );
    let bob_session = match to(&out, bob).as_slice() {
        [ServerMsg::RoomJoined(entered)] => {
            assert_eq!(entered.player_number, 2);
            assert_eq!(entered.players.len(), 2);
            entered.session_token
        }
        other => panic!("unexpected {other:?}"),
    };
    match to(&out, ann).as_slice() {
        [ServerMsg::PlayerJoined { player_number, .. }] => assert_eq!(*player_number, 2),
        other => panic!("unexpected {other:?}"),
    }

    Table {
        relay,
        room_id,
        ann,
        bob,
        bob_session,
    }
}

fn start(t: &mut Table) -> u64 {
    let out = t.relay.handle(
        t.ann,
        ClientMsg::StartGame {
            room_id: t.room_id.clone(),
        },
    );
    let seeds: Vec<u64> = out
        .iter()
        .map(|e| match &e.msg {
            ServerMsg::GameStarting { random_seed, .. } => *random_seed,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[0], seeds[1]);
    seeds[0]
}

mod lobby {
    use super::*;

    #[test]
    fn third_player_bounced_from_full_room() {
        let mut t = table(2);
        let carol = conn();
        let out = t.relay.handle(
            carol,
            ClientMsg::JoinRoom {
                room_code: t.room_id.clone(),
                nickname: "Carol".into(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(error_code(&out[0].msg), Some("room_full"));
        assert_eq!(out[0].to, carol);
    }

    #[test]
    fn only_host_starts() {
        let mut t = table(2);
        let out = t.relay.handle(
            t.bob,
            ClientMsg::StartGame {
                room_id: t.room_id.clone(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, t.bob);
        assert_eq!(error_code(&out[0].msg), Some("not_host"));

        start(&mut t);
        let room = t.relay.registry().room(&t.room_id).unwrap();
        assert_eq!(room.state, RoomState::Playing);
    }

    #[test]
    fn duplicate_nickname_gets_suffix() {
        let mut relay = SessionRelay::new(StartMode::Lobby, true);
        let ann = conn();
        let other_ann = conn();
        let out = relay.handle(
            ann,
            ClientMsg::CreateRoom {
                name: "Fruit Stand".into(),
                max_players: 3,
                host_nickname: "Ann".into(),
            },
        );
        let room_id = match &out[0].msg {
            ServerMsg::RoomCreated(entered) => entered.room_id.clone(),
            other => panic!("unexpected {other:?}"),
        };

        let out = relay.handle(
            other_ann,
            ClientMsg::JoinRoom {
                room_code: room_id,
                nickname: "Ann".into(),
            },
        );
        match to(&out, other_ann).as_slice() {
            [ServerMsg::RoomJoined(entered)] => {
                let names: Vec<&str> = entered.players.iter().map(|p| p.nickname.as_str()).collect();
                assert_eq!(names, vec!["Ann", "Ann1"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn host_leaving_hands_over() {
        let mut t = table(3);
        let out = t.relay.handle(
            t.ann,
            ClientMsg::LeaveRoom {
                room_id: t.room_id.clone(),
            },
        );
        assert!(matches!(to(&out, t.ann).as_slice(), [ServerMsg::RoomLeft { .. }]));
        let bob_msgs = to(&out, t.bob);
        assert!(matches!(bob_msgs[0], ServerMsg::PlayerLeft { player_number: 1, .. }));
        assert!(matches!(bob_msgs[1], ServerMsg::NewHost { player_number: 1, .. }));

        let room = t.relay.registry().room(&t.room_id).unwrap();
        assert!(room.is_host(t.bob));
    }

    #[test]
    fn last_member_leaving_closes_room() {
        let mut t = table(2);
        t.relay.disconnect(t.bob);
        let out = t.relay.disconnect(t.ann);
        assert!(out.is_empty());
        assert!(t.relay.registry().room(&t.room_id).is_none());
    }

    #[test]
    fn rooms_list_hides_started_rooms() {
        let mut t = table(3);
        let viewer = conn();
        let out = t.relay.handle(viewer, ClientMsg::GetRooms);
        match &out[0].msg {
            ServerMsg::RoomsList { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].player_count, 2);
                assert_eq!(rooms[0].host_nickname, "Ann");
            }
            other => panic!("unexpected {other:?}"),
        }

        start(&mut t);
        let out = t.relay.handle(viewer, ClientMsg::GetRooms);
        assert_eq!(out[0].msg, ServerMsg::RoomsList { rooms: vec![] });
    }
}

mod gameplay {
    use super::*;

    fn fruit_move(room_id: &str, player_number: PlayerNumber, seq: u64) -> ClientMsg {
        ClientMsg::FruitMove {
            room_id: room_id.to_string(),
            player_number,
            seq,
            x: 210.0,
            y: 50.0,
        }
    }

    #[test]
    fn deltas_dropped_outside_playing() {
        let mut t = table(2);
        let out = t.relay.handle(t.ann, fruit_move(&t.room_id, 1, 1));
        assert!(out.is_empty());
    }

    #[test]
    fn deltas_relayed_to_others_only() {
        let mut t = table(2);
        start(&mut t);
        let out = t.relay.handle(t.ann, fruit_move(&t.room_id, 1, 3));
        assert_eq!(
            out,
            vec![Envelope {
                to: t.bob,
                msg: ServerMsg::OpponentFruitMove {
                    player_number: 1,
                    seq: 3,
                    x: 210.0,
                    y: 50.0,
                },
            }]
        );
    }

    #[test]
    fn spoofed_player_number_dropped() {
        let mut t = table(2);
        start(&mut t);
        assert!(t.relay.handle(t.ann, fruit_move(&t.room_id, 2, 1)).is_empty());

        let outsider = conn();
        assert!(t.relay.handle(outsider, fruit_move(&t.room_id, 1, 1)).is_empty());
    }

    #[test]
    fn bad_payloads_dropped() {
        let mut t = table(2);
        start(&mut t);
        let out = t.relay.handle(
            t.ann,
            ClientMsg::FruitMove {
                room_id: t.room_id.clone(),
                player_number: 1,
                seq: 1,
                x: f32::INFINITY,
                y: 0.0,
            },
        );
        assert!(out.is_empty());

        let out = t.relay.handle(
            t.ann,
            ClientMsg::FruitDropped {
                room_id: t.room_id.clone(),
                player_number: 1,
                seq: 2,
                fruit_index: 11,
                next_fruit_index: 0,
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn snapshot_request_routed_to_requester() {
        let mut t = table(2);
        start(&mut t);

        let out = t.relay.handle(
            t.bob,
            ClientMsg::RequestCompleteState {
                room_id: t.room_id.clone(),
                target_player_number: 1,
            },
        );
        assert_eq!(
            out,
            vec![Envelope {
                to: t.ann,
                msg: ServerMsg::CompleteStateRequested {
                    requester_player_number: 2,
                },
            }]
        );

        let out = t.relay.handle(
            t.ann,
            ClientMsg::SendCompleteState {
                room_id: t.room_id.clone(),
                requester_player_number: 2,
                game_state: snapshot(1, 9),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, t.bob);
        assert!(matches!(out[0].msg, ServerMsg::OpponentCompleteState { .. }));
    }

    #[test]
    fn periodic_snapshot_goes_to_others() {
        let mut t = table(2);
        start(&mut t);
        let out = t.relay.handle(
            t.bob,
            ClientMsg::CompleteGameState {
                room_id: t.room_id.clone(),
                game_state: snapshot(2, 12),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, t.ann);
    }

    #[test]
    fn score_update_reaches_sender_too() {
        let mut t = table(2);
        start(&mut t);
        let out = t.relay.handle(
            t.bob,
            ClientMsg::ScoreUpdate {
                room_id: t.room_id.clone(),
                player_number: 2,
                score: 340,
            },
        );
        assert_eq!(out.len(), 2);
        for envelope in &out {
            match &envelope.msg {
                ServerMsg::ScoreUpdate { scores } => assert_eq!(scores.get(&2), Some(&340)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn win_then_play_again() {
        let mut t = table(2);
        start(&mut t);
        let out = t.relay.handle(
            t.ann,
            ClientMsg::PlayerWon {
                room_id: t.room_id.clone(),
                player_number: 1,
                score: 2000,
                merge_count: 31,
            },
        );
        assert_eq!(out.len(), 2);
        match &out[0].msg {
            ServerMsg::GameWon { winner } => {
                assert_eq!(winner.nickname, "Ann");
                assert_eq!(winner.merge_count, 31);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            t.relay.registry().room(&t.room_id).unwrap().state,
            RoomState::Finished
        );

        let out = t.relay.handle(
            t.bob,
            ClientMsg::PlayAgain {
                room_id: t.room_id.clone(),
            },
        );
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| matches!(e.msg, ServerMsg::RoomReset { .. })));
        assert_eq!(
            t.relay.registry().room(&t.room_id).unwrap().state,
            RoomState::Waiting
        );
    }
}

mod reconnect {
    use super::*;

    fn rejoin(room_id: &str, prior: Option<Uuid>, nickname: &str) -> ClientMsg {
        ClientMsg::JoinGameRoom {
            room_id: room_id.to_string(),
            nickname: nickname.to_string(),
            prior_identity: prior,
        }
    }

    #[test]
    fn drop_mid_game_then_reclaim_by_session() {
        let mut t = table(2);
        let seed = start(&mut t);

        let out = t.relay.disconnect(t.bob);
        match to(&out, t.ann).as_slice() {
            [ServerMsg::PlayerLeft { player_number, players }, ServerMsg::RoomStateChanged { state, .. }] => {
                assert_eq!(*player_number, 2);
                assert_eq!(players.len(), 1);
                assert_eq!(*state, RoomState::Waiting);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            t.relay.registry().room(&t.room_id).unwrap().state,
            RoomState::Waiting
        );

        let bob_again = conn();
        let out = t
            .relay
            .handle(bob_again, rejoin(&t.room_id, Some(t.bob_session), "Bob"));
        match to(&out, bob_again).as_slice() {
            [ServerMsg::GameJoined {
                player_number,
                state,
                random_seed,
                session_token,
                ..
            }, ServerMsg::RoomStateChanged { .. }] => {
                assert_eq!(*player_number, 2);
                assert_eq!(*state, RoomState::Playing);
                assert_eq!(*random_seed, Some(seed));
                assert_eq!(*session_token, t.bob_session);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            to(&out, t.ann).as_slice(),
            [
                ServerMsg::PlayerJoined { player_number: 2, .. },
                ServerMsg::RoomStateChanged {
                    state: RoomState::Playing,
                    ..
                }
            ]
        ));
    }

    #[test]
    fn live_slot_rebound_by_session() {
        let mut t = table(2);
        start(&mut t);

        let bob_tab = conn();
        let out = t
            .relay
            .handle(bob_tab, rejoin(&t.room_id, Some(t.bob_session), "Bob"));
        assert!(matches!(
            to(&out, bob_tab).as_slice(),
            [ServerMsg::GameJoined { player_number: 2, .. }]
        ));
        assert!(matches!(to(&out, t.bob).as_slice(), [ServerMsg::RoomLeft { .. }]));
        assert!(matches!(
            to(&out, t.ann).as_slice(),
            [ServerMsg::PlayerReconnected { player_number: 2, .. }]
        ));

        let room = t.relay.registry().room(&t.room_id).unwrap();
        assert_eq!(room.player_number_of(bob_tab), Some(2));
        assert_eq!(room.player_number_of(t.bob), None);
        assert_eq!(t.relay.registry().profiles().nickname_of(&bob_tab), "Bob");
    }

    #[test]
    fn already_seated_connection_is_idempotent() {
        let mut t = table(2);
        let out = t.relay.handle(t.bob, rejoin(&t.room_id, None, "Bob"));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].msg, ServerMsg::GameJoined { player_number: 2, .. }));
        assert_eq!(t.relay.registry().room(&t.room_id).unwrap().len(), 2);
    }
}

mod replicas {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, Instant};
    use suika_party_server::replica::{
        ClientSession, InertWorld, LocalBoard, LocalSync, Outcome, ReplicaConfig,
    };

    struct Delivery {
        to: ConnectionId,
        msg: ServerMsg,
        outcome: Outcome,
    }

    /// A relay plus one client session per connection, wired together
    struct Party {
        relay: SessionRelay,
        clients: HashMap<ConnectionId, ClientSession<InertWorld>>,
        now: Instant,
    }

    impl Party {
        fn new() -> Self {
            Self {
                relay: SessionRelay::new(StartMode::Lobby, true),
                clients: HashMap::new(),
                now: Instant::now(),
            }
        }

        fn deliver(&mut self, envelopes: Vec<Envelope>) -> Vec<Delivery> {
            let now = self.now;
            envelopes
                .into_iter()
                .map(|Envelope { to, msg }| {
                    let outcome = self
                        .clients
                        .entry(to)
                        .or_insert_with(|| ClientSession::new(ReplicaConfig::default()))
                        .apply(&msg, now);
                    Delivery { to, msg, outcome }
                })
                .collect()
        }

        fn send(&mut self, from: ConnectionId, msg: ClientMsg) -> Vec<Delivery> {
            let out = self.relay.handle(from, msg);
            self.deliver(out)
        }

        fn drop_connection(&mut self, connection: ConnectionId) -> Vec<Delivery> {
            self.clients.remove(&connection);
            let out = self.relay.disconnect(connection);
            self.deliver(out)
        }

        fn client(&mut self, connection: ConnectionId) -> &mut ClientSession<InertWorld> {
            self.clients.get_mut(&connection).expect("client never heard from the relay")
        }

        /// Send whatever the client's own sender produces
        fn play(
            &mut self,
            from: ConnectionId,
            f: impl FnOnce(&mut LocalSync) -> ClientMsg,
        ) -> Vec<Delivery> {
            let msg = f(self.client(from).local().expect("no game in progress"));
            self.send(from, msg)
        }

        /// One drop, plus the periodic snapshot when it comes due
        fn drop_piece(&mut self, from: ConnectionId) -> Vec<Delivery> {
            let world = InertWorld::new();
            let mut out = self.play(from, |sync| sync.piece_dropped(0, 1));
            let snapshot = self
                .client(from)
                .local()
                .and_then(|sync| {
                    sync.periodic_snapshot(LocalBoard {
                        world: &world,
                        in_flight: None,
                        current_piece: Some(0),
                        next_piece: Some(1),
                    })
                });
            if let Some(msg) = snapshot {
                out.extend(self.send(from, msg));
            }

            self.now += Duration::from_millis(1100);
            let now = self.now;
            for client in self.clients.values_mut() {
                client.advance(now);
            }
            out
        }
    }

    fn outcomes_at(out: &[Delivery], connection: ConnectionId) -> Vec<Outcome> {
        out.iter()
            .filter(|d| d.to == connection)
            .map(|d| d.outcome)
            .collect()
    }

    fn rejoin(room_id: &str, prior: SessionToken, nickname: &str) -> ClientMsg {
        ClientMsg::JoinGameRoom {
            room_id: room_id.to_string(),
            nickname: nickname.to_string(),
            prior_identity: Some(prior),
        }
    }

    /// Ann hosts a two-seat room, Bob joins, Ann starts
    fn started_game(
        party: &mut Party,
        ann: ConnectionId,
        bob: ConnectionId,
    ) -> (RoomId, SessionToken, SessionToken) {
        let out = party.send(
            ann,
            ClientMsg::CreateRoom {
                name: "Fruit Stand".into(),
                max_players: 2,
                host_nickname: "Ann".into(),
            },
        );
        let (room_id, ann_session) = out
            .iter()
            .find_map(|d| match &d.msg {
                ServerMsg::RoomCreated(entered) => {
                    Some((entered.room_id.clone(), entered.session_token))
                }
                _ => None,
            })
            .unwrap();

        let out = party.send(
            bob,
            ClientMsg::JoinRoom {
                room_code: room_id.clone(),
                nickname: "Bob".into(),
            },
        );
        let bob_session = out
            .iter()
            .find_map(|d| match &d.msg {
                ServerMsg::RoomJoined(entered) => Some(entered.session_token),
                _ => None,
            })
            .unwrap();

        party.send(
            ann,
            ClientMsg::StartGame {
                room_id: room_id.clone(),
            },
        );
        assert_eq!(party.client(ann).local().unwrap().player_number(), 1);
        assert_eq!(party.client(bob).local().unwrap().player_number(), 2);
        (room_id, ann_session, bob_session)
    }

    #[test]
    fn seat_reclaimed_at_front_keeps_engines_in_step() {
        let mut party = Party::new();
        let (ann, bob) = (conn(), conn());
        let (room_id, ann_session, _) = started_game(&mut party, ann, bob);

        let out = party.drop_connection(ann);
        assert!(out.iter().any(|d| d.to == bob
            && d.msg
                == ServerMsg::RoomStateChanged {
                    room_id: room_id.clone(),
                    state: RoomState::Waiting,
                }));
        assert_eq!(party.client(bob).engine().local_player(), Some(1));
        assert_eq!(party.client(bob).local().unwrap().player_number(), 1);

        let ann_again = conn();
        let out = party.send(ann_again, rejoin(&room_id, ann_session, "Ann"));
        assert!(out
            .iter()
            .any(|d| d.to == bob && matches!(d.msg, ServerMsg::PlayerJoined { player_number: 1, .. })));

        let bob_client = party.client(bob);
        assert_eq!(bob_client.engine().local_player(), Some(2));
        assert_eq!(bob_client.engine().room_state(), Some(RoomState::Playing));
        assert_eq!(bob_client.local().unwrap().player_number(), 2);
        assert!(bob_client.engine().peer(1).is_some());
        assert!(bob_client.engine().peer(2).is_none());
        assert_eq!(party.client(ann_again).engine().local_player(), Some(1));

        let out = party.play(ann_again, |sync| sync.initial_piece(0));
        assert_eq!(outcomes_at(&out, bob), vec![Outcome::Applied]);

        let out = party.play(bob, |sync| sync.initial_piece(1));
        assert_eq!(outcomes_at(&out, ann_again), vec![Outcome::Applied]);
    }

    #[test]
    fn reload_with_live_socket_restarts_ordering() {
        let mut party = Party::new();
        let (ann, bob) = (conn(), conn());
        let (room_id, _, bob_session) = started_game(&mut party, ann, bob);

        party.play(bob, |sync| sync.initial_piece(0));
        for _ in 0..10 {
            party.drop_piece(bob);
        }
        let replica = party.client(ann).engine().peer(2).unwrap();
        assert_eq!(replica.last_snapshot_seq(), Some(13));

        let bob_tab = conn();
        let out = party.send(bob_tab, rejoin(&room_id, bob_session, "Bob"));
        assert!(out
            .iter()
            .any(|d| d.to == ann && matches!(d.msg, ServerMsg::PlayerReconnected { player_number: 2, .. })));
        assert!(out
            .iter()
            .any(|d| d.to == bob && matches!(d.msg, ServerMsg::RoomLeft { .. })));
        assert_eq!(party.client(ann).engine().peer(2).unwrap().last_snapshot_seq(), None);

        let out = party.play(bob_tab, |sync| sync.initial_piece(2));
        assert_eq!(outcomes_at(&out, ann), vec![Outcome::Applied]);

        let mut snapshots = Vec::new();
        for _ in 0..5 {
            let out = party.drop_piece(bob_tab);
            snapshots.extend(
                out.into_iter()
                    .filter(|d| matches!(d.msg, ServerMsg::OpponentCompleteState { .. })),
            );
        }
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].to, ann);
        assert_eq!(snapshots[0].outcome, Outcome::Applied);
        assert_eq!(party.client(ann).engine().peer(2).unwrap().last_snapshot_seq(), Some(7));
    }
}

mod service {
    use super::*;
    use suika_party_server::config::Config;
    use suika_party_server::relay::RelayService;
    use tokio::sync::mpsc::Receiver;
    use tokio::time::{timeout, Duration};

    async fn next(rx: &mut Receiver<ServerMsg>) -> ServerMsg {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for relay")
            .expect("outbound closed")
    }

    #[tokio::test]
    async fn two_clients_through_the_relay_task() {
        let (service, handle) = RelayService::new(&Config::default());
        tokio::spawn(service.run());

        let ann = conn();
        let bob = conn();
        let mut ann_rx = handle.register(ann).await.unwrap();
        let mut bob_rx = handle.register(bob).await.unwrap();
        assert!(matches!(next(&mut ann_rx).await, ServerMsg::Welcome { .. }));
        assert!(matches!(next(&mut bob_rx).await, ServerMsg::Welcome { .. }));

        handle
            .submit(
                ann,
                ClientMsg::CreateRoom {
                    name: "Orchard".into(),
                    max_players: 2,
                    host_nickname: "Ann".into(),
                },
            )
            .await;
        let room_id = match next(&mut ann_rx).await {
            ServerMsg::RoomCreated(entered) => entered.room_id,
            other => panic!("unexpected {other:?}"),
        };

        handle
            .submit(
                bob,
                ClientMsg::JoinRoom {
                    room_code: room_id.clone(),
                    nickname: "Bob".into(),
                },
            )
            .await;
        assert!(matches!(next(&mut bob_rx).await, ServerMsg::RoomJoined(_)));
        assert!(matches!(next(&mut ann_rx).await, ServerMsg::PlayerJoined { .. }));

        let rooms = handle.rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].players.len(), 2);

        handle.unregister(bob).await;
        assert!(matches!(
            next(&mut ann_rx).await,
            ServerMsg::PlayerLeft { player_number: 2, .. }
        ));
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.rooms, 1);
    }
}
