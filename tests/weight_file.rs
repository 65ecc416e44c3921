use std::fs;

use backprop::{
    NetErr,
    arch::{Sequential, activations::ActFn, loss::CostFn},
    dataset::TrainingExample,
    training::HyperParameters,
};
use rand::{SeedableRng, rngs::StdRng};
use tempfile::tempdir;

fn network(seed: u64, hidden: usize) -> Sequential {
    let params = HyperParameters {
        momentum: 0.5,
        ..Default::default()
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut net = Sequential::with_hyper_parameters(3, CostFn::Mse, &params).unwrap();
    net.add_layers(ActFn::Sigmoid, &[hidden], &mut rng);
    net.add_layers(ActFn::Linear, &[2], &mut rng);
    net
}

fn trained(seed: u64) -> Sequential {
    let mut net = network(seed, 4);
    let examples = [
        TrainingExample::new(vec![0.1, 0.2, 0.3], vec![1., -1.]),
        TrainingExample::new(vec![-0.5, 0.9, 0.0], vec![0.25, 0.5]),
    ];

    for _ in 0..5 {
        net.train_batch(&examples, 0.3).unwrap();
    }

    net
}

fn bits(net: &Sequential) -> Vec<u64> {
    net.layers()
        .iter()
        .flat_map(|layer| {
            layer
                .weights()
                .iter()
                .chain(layer.biases())
                .chain(layer.weight_velocities())
                .chain(layer.bias_velocities())
                .map(|v| v.to_bits())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn untouched_network_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.weights");

    let net = network(1, 4);
    net.save_weights(&path).unwrap();
    assert!(path.exists());

    let mut loaded = network(2, 4);
    assert_ne!(bits(&loaded), bits(&net));

    loaded.load_weights(&path).unwrap();
    assert_eq!(bits(&loaded), bits(&net));
}

#[test]
fn velocities_survive_a_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trained.weights");

    let net = trained(5);
    assert!(net.layers()[0].bias_velocities().iter().any(|&v| v != 0.));
    net.save_weights(&path).unwrap();

    let mut loaded = network(6, 4);
    loaded.load_weights(&path).unwrap();
    assert_eq!(bits(&loaded), bits(&net));

    let input = [0.3, -0.2, 0.7];
    assert_eq!(net.predict(&input).unwrap(), loaded.predict(&input).unwrap());
}

#[test]
fn save_overwrites_previous_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.weights");
    let stale = "stale content that is much longer than nothing at all\n".repeat(500);
    fs::write(&path, stale).unwrap();

    let net = network(3, 2);
    net.save_weights(&path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();

    // header, then per node one bias line and one line per input
    assert_eq!(lines[0], "I_2_3_2_3_2_2");
    assert_eq!(lines.len(), 1 + 2 * (1 + 3) + 2 * (1 + 2));
    assert!(lines[1].starts_with("b_0_0_"));
    assert!(lines[2].starts_with("0_0_0_"));
}

#[test]
fn line_order_does_not_matter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shuffled.weights");

    let net = trained(7);
    net.save_weights(&path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let reversed: Vec<&str> = content.lines().rev().collect();
    fs::write(&path, reversed.join("\n")).unwrap();

    let mut loaded = network(8, 4);
    loaded.load_weights(&path).unwrap();
    assert_eq!(bits(&loaded), bits(&net));
}

#[test]
fn topology_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("net.weights");
    network(1, 4).save_weights(&path).unwrap();

    let mut other = network(2, 5);
    let before = bits(&other);

    let err = other.load_weights(&path).unwrap_err();
    assert!(matches!(
        err,
        NetErr::TopologyMismatch { ref expected, ref found }
            if expected == "I_2_3_5_3_2_5" && found == "I_2_3_4_3_2_4"
    ));
    assert_eq!(bits(&other), before);
}

#[test]
fn malformed_files_are_rejected_whole() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.weights");

    network(1, 4).save_weights(&path).unwrap();
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str("0_0_0_not-a-number_0\n");
    fs::write(&path, &content).unwrap();

    let mut net = network(2, 4);
    let before = bits(&net);

    let err = net.load_weights(&path).unwrap_err();
    let last_line = content.lines().count();
    assert!(matches!(err, NetErr::MalformedRecord { line, .. } if line == last_line));
    assert_eq!(bits(&net), before);
}

#[test]
fn out_of_range_and_headerless_files_are_rejected() {
    let dir = tempdir().unwrap();
    let mut net = network(1, 4);
    let before = bits(&net);

    let out_of_range = dir.path().join("range.weights");
    fs::write(&out_of_range, "I_2_3_4_3_2_4\nb_0_0_1_0\n0_4_0_1_0\n").unwrap();
    assert!(matches!(
        net.load_weights(&out_of_range),
        Err(NetErr::MalformedRecord { line: 3, .. })
    ));

    let huge = dir.path().join("huge.weights");
    fs::write(&huge, "I_9223372036854775808_2\n").unwrap();
    assert!(matches!(
        net.load_weights(&huge),
        Err(NetErr::MalformedRecord { line: 1, .. })
    ));

    let headerless = dir.path().join("headerless.weights");
    fs::write(&headerless, "b_0_0_1_0\n").unwrap();
    assert!(matches!(
        net.load_weights(&headerless),
        Err(NetErr::MalformedRecord { .. })
    ));

    assert_eq!(bits(&net), before);
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempdir().unwrap();
    let mut net = network(1, 4);

    let err = net.load_weights(dir.path().join("nope.weights")).unwrap_err();
    assert!(matches!(err, NetErr::Io(_)));
}

#[test]
fn saving_into_a_missing_directory_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("net.weights");

    let err = network(1, 4).save_weights(&path).unwrap_err();
    assert!(matches!(err, NetErr::Io(_)));
    assert!(!path.exists());
}
