#[cfg(test)]
mod scenario_tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use adhocsim::config::ScenarioConfig;
    use adhocsim::flowmon::{read_report, DropReason, FlowRecord};
    use adhocsim::ip::AddressError;
    use adhocsim::scenario::{SetupError, Simulation};
    use adhocsim::wifi::{LossModel, MacType};

    fn scenario(nodes: u32) -> ScenarioConfig {
        let mut config = ScenarioConfig::default();
        config.general.node_count = nodes;
        config.general.verbose = false;
        config
    }

    fn run(config: ScenarioConfig) -> Simulation {
        let mut sim = Simulation::new(config).unwrap();
        sim.run();
        sim
    }

    fn request_flow(records: &[FlowRecord], client: Ipv4Addr) -> &FlowRecord {
        records
            .iter()
            .find(|r| r.key.source_address == client && r.key.destination_port == 9)
            .unwrap_or_else(|| panic!("no request flow from {}", client))
    }

    fn assert_flow_invariants(records: &[FlowRecord]) {
        for record in records {
            let stats = &record.stats;
            assert!(stats.rx_packets <= stats.tx_packets, "flow {} received more than it sent", record.flow_id);
            assert_eq!(stats.lost_packets, stats.tx_packets - stats.rx_packets);
            if let Some(delay) = record.metrics.mean_delay_secs {
                assert!(delay >= 0.0);
            }
        }
    }

    /// One client, one server, ideal channel: sends at 2..9 s all land in
    /// the server's window and come back.
    #[test]
    fn test_two_nodes_echo_everything() {
        let sim = run(scenario(2));
        let clients = sim.clients();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].sent, 8);
        assert_eq!(clients[0].received, 8);
        assert_eq!(sim.server_received(), 8);

        let records = sim.monitor().records();
        assert_eq!(records.len(), 2);
        assert_flow_invariants(&records);

        let request = &records[0];
        assert_eq!(request.flow_id, 1);
        assert_eq!(request.key.source_address, Ipv4Addr::new(10, 1, 1, 2));
        assert_eq!(request.key.source_port, 49153);
        assert_eq!(request.key.destination_address, Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(request.key.protocol, 17);
        assert_eq!(request.stats.tx_packets, 8);
        assert_eq!(request.stats.rx_packets, 8);
        assert_eq!(request.stats.tx_bytes, 8 * 1052);
        assert_eq!(request.stats.lost_packets, 0);
        assert!(request.stats.drops.is_empty());

        let echo = &records[1];
        assert_eq!(echo.key.source_port, 9);
        assert_eq!(echo.stats.tx_packets, 8);
        assert_eq!(echo.stats.rx_packets, 8);

        // DIFS + airtime of a 1088 byte frame + a few ns of propagation
        let delay = request.metrics.mean_delay_secs.unwrap();
        assert!(delay > 0.0015 && delay < 0.0016, "unexpected delay {}", delay);
        assert_eq!(sim.phy_totals().collisions, 0);
    }

    #[test]
    fn test_thirty_nodes_yield_twenty_nine_flows() {
        let sim = run(scenario(30));
        let records = sim.monitor().records();
        assert_eq!(records.len(), 29);
        assert_flow_invariants(&records);
        for record in &records {
            assert!(record.stats.tx_packets <= 10);
            assert_eq!(record.key.destination_port, 9);
        }
        let ids: Vec<u32> = records.iter().map(|r| r.flow_id).collect();
        assert_eq!(ids, (1..=29).collect::<Vec<_>>());
    }

    /// Two clients finish sensing at the same instant. Carrier sense cannot
    /// see a signal that has not propagated yet, so both frames overlap at
    /// the server.
    #[test]
    fn test_simultaneous_clients_collide() {
        let sim = run(scenario(3));
        let records = sim.monitor().records();
        assert_flow_invariants(&records);

        let collided: u64 = records
            .iter()
            .filter(|r| r.key.destination_port == 9)
            .filter_map(|r| r.stats.drops.get(&DropReason::Collision))
            .map(|d| d.packets)
            .sum();
        assert!(collided >= 1);
        let lost: u64 = records.iter().map(|r| r.stats.lost_packets).sum();
        assert!(lost >= 1);
        assert!(sim.phy_totals().collisions >= 1);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let mut config = scenario(6);
        config.channel.loss = LossModel::Random { drop_probability: 0.3 };
        config.general.seed = 42;

        let first = run(config.clone());
        let second = run(config);
        assert_eq!(first.monitor().records(), second.monitor().records());
        assert_eq!(first.summary().unwrap().events_executed, second.summary().unwrap().events_executed);
        assert_eq!(first.clients(), second.clients());
    }

    #[test]
    fn test_rts_cts_still_delivers() {
        let mut config = scenario(2);
        config.mac.rts_cts_threshold = 500;
        let sim = run(config);
        let clients = sim.clients();
        assert_eq!(clients[0].sent, 8);
        assert_eq!(clients[0].received, 8);
        // RTS, CTS and data for each request and each echo
        assert_eq!(sim.phy_totals().tx_frames, 8 * 2 * 3);
    }

    #[test]
    fn test_aloha_two_nodes() {
        let mut config = scenario(2);
        config.mac.mac_type = MacType::Aloha;
        let sim = run(config);
        assert_eq!(sim.clients()[0].received, 8);
    }

    #[test]
    fn test_out_of_range_client_gets_nothing() {
        let mut config = scenario(3);
        config.channel.loss = LossModel::Range { max_range: 15.0 };
        let sim = run(config);
        let records = sim.monitor().records();
        assert_flow_invariants(&records);

        // Node 2 sits 20 m from the server.
        let far = request_flow(&records, Ipv4Addr::new(10, 1, 1, 3));
        assert_eq!(far.stats.tx_packets, 8);
        assert_eq!(far.stats.rx_packets, 0);

        // Node 1 is in range and its requests are not disturbed at the server.
        let near = request_flow(&records, Ipv4Addr::new(10, 1, 1, 2));
        assert_eq!(near.stats.rx_packets, 8);

        let clients = sim.clients();
        assert_eq!(clients[0].received, 8);
        assert_eq!(clients[1].received, 0);
    }

    #[test]
    fn test_lossy_channel_drops_everything() {
        let mut config = scenario(2);
        config.channel.loss = LossModel::Random { drop_probability: 1.0 };
        let sim = run(config);
        let records = sim.monitor().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stats.rx_packets, 0);
        assert_eq!(records[0].stats.drops[&DropReason::ChannelLoss].packets, 8);
        assert_eq!(sim.clients()[0].received, 0);
    }

    /// Requests that arrive before the server binds reach the node but no
    /// application.
    #[test]
    fn test_requests_before_server_start_are_ignored() {
        let mut config = scenario(2);
        config.server.start = Duration::from_secs(5);
        let sim = run(config);
        let records = sim.monitor().records();

        let request = &records[0];
        assert_eq!(request.stats.rx_packets, 8);
        assert_eq!(request.stats.drops[&DropReason::NoSocket].packets, 3);
        assert_eq!(records[1].stats.tx_packets, 5);
        assert_eq!(sim.clients()[0].received, 5);
    }

    #[test]
    fn test_unlimited_client_runs_until_stop() {
        let mut config = scenario(2);
        config.client.max_packets = 0;
        config.client.interval = Duration::from_millis(500);
        let sim = run(config);
        // 2.0, 2.5, ... 9.5 s
        assert_eq!(sim.clients()[0].sent, 16);
    }

    #[test]
    fn test_subnet_exhaustion_is_fatal() {
        let mut config = scenario(7);
        config.addressing.mask = Ipv4Addr::new(255, 255, 255, 248);
        let err = Simulation::new(config).unwrap_err();
        assert!(matches!(err, SetupError::Address(AddressError::SubnetExhausted { .. })));
    }

    #[test]
    fn test_statistics_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sim = run(scenario(2));

        let yaml = dir.path().join("Data.yaml");
        sim.serialize(&yaml).unwrap();
        let loaded = read_report(&yaml).unwrap();
        assert_eq!(loaded.flows, sim.monitor().records());
        assert_eq!(loaded.metadata.node_count, 2);
        assert_eq!(loaded.metadata.seed, 1);

        let json = dir.path().join("Data.json");
        sim.serialize(&json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["flows"].as_array().unwrap().len(), 2);
        assert_eq!(value["flows"][0]["stats"]["tx_packets"], 8);
        assert_eq!(read_report(&json).unwrap().flows.len(), 2);
    }
}
