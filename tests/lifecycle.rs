mod common;

use burn::prelude::*;
use burn::tensor::Distribution;
use burn_dcgan::prelude::*;
use common::*;

#[test]
fn composed_pair_scores_latent_vectors() {
    let configs = [
        GanConfig::new("mnist_gan".to_string(), 28, 28, 1),
        GanConfig::new("rgb".to_string(), 8, 12, 3)
            .with_depth(4)
            .with_generator_depth(32)
            .with_latent_dim(10),
        tiny_config().with_stride(1),
    ];

    for config in configs {
        let latent_dim = config.latent_dim;
        let mut gan = Gan::<TestAutodiffBackend>::new(config, Default::default()).unwrap();
        gan.build_scorer().unwrap();
        gan.build_generator().unwrap();
        let pair = gan.build_adversarial().unwrap();
        assert_eq!(pair.latent_dim(), latent_dim);

        let device = Default::default();
        let noise = Tensor::<TestAutodiffBackend, 2>::random(
            [2, latent_dim],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let (Some(generator), Some(scorer)) = (gan.generator(), gan.scorer()) else {
            panic!("both models are built");
        };
        let scores = gan
            .adversarial()
            .unwrap()
            .forward(generator, scorer.model(), noise);
        assert_eq!(scores.dims(), [2, 1]);
        assert!(values(scores).iter().all(|p| (0.0..=1.0).contains(p)));
    }
}

#[test]
fn building_twice_returns_the_existing_models() {
    let mut gan = Gan::<TestAutodiffBackend>::new(tiny_config(), Default::default()).unwrap();
    let first = values(gan.build_scorer().unwrap().output.weight.val());
    gan.build_generator().unwrap();
    assert_eq!(gan.lifecycle(), Lifecycle::Built);

    let second = values(gan.build_scorer().unwrap().output.weight.val());
    assert_eq!(first, second);
    gan.build_generator().unwrap();
    assert_eq!(gan.lifecycle(), Lifecycle::Built);
}

#[test]
fn out_of_order_operations_are_state_errors() {
    let mut gan = Gan::<TestAutodiffBackend>::new(tiny_config(), Default::default()).unwrap();

    let err = gan.compile_scorer(0.0002).unwrap_err();
    assert!(matches!(
        err,
        GanError::State {
            expected: Lifecycle::Built,
            actual: Lifecycle::Uninitialized,
            ..
        }
    ));
    let err = gan.build_adversarial().err().unwrap();
    assert!(matches!(err, GanError::State { .. }));

    gan.build_scorer().unwrap();
    gan.build_generator().unwrap();
    let err = gan
        .train(&datasets(4, [8, 8, 1]), &TrainingConfig::new(1, 2))
        .unwrap_err();
    assert!(matches!(
        err,
        GanError::State {
            operation: "train",
            expected: Lifecycle::Compiled,
            actual: Lifecycle::Built,
        }
    ));

    gan.compile_scorer(0.0002).unwrap();
    let err = gan.compile_scorer(0.0002).unwrap_err();
    assert!(matches!(
        err,
        GanError::State {
            actual: Lifecycle::Compiled,
            ..
        }
    ));

    gan.compile_adversarial(0.00009).unwrap();
    assert_eq!(gan.lifecycle(), Lifecycle::Compiled);
    let err = gan.compile_adversarial(0.00009).unwrap_err();
    assert!(matches!(err, GanError::State { .. }));
}

#[test]
fn invalid_learning_rates_are_preconditions() {
    let mut gan = Gan::<TestAutodiffBackend>::new(tiny_config(), Default::default()).unwrap();
    gan.build_scorer().unwrap();
    gan.build_generator().unwrap();
    let err = gan.compile_scorer(-1.0).unwrap_err();
    assert!(matches!(err, GanError::Precondition { .. }));
    assert_eq!(gan.lifecycle(), Lifecycle::Built);
}

#[test]
fn reset_allows_rebuilding() {
    let mut gan = compiled_gan(tiny_config());
    gan.train(&datasets(8, [8, 8, 1]), &TrainingConfig::new(2, 2))
        .unwrap();
    assert_eq!(gan.lifecycle(), Lifecycle::Done);

    gan.reset();
    assert_eq!(gan.lifecycle(), Lifecycle::Uninitialized);
    assert_eq!(gan.training_state(), &TrainingState::default());
    let err = gan
        .train(&datasets(8, [8, 8, 1]), &TrainingConfig::new(1, 2))
        .unwrap_err();
    assert!(matches!(err, GanError::State { .. }));

    gan.initialize_models().unwrap();
    assert_eq!(gan.lifecycle(), Lifecycle::Compiled);
}

#[test]
fn initialization_uses_the_configured_learning_rates() {
    let gan = compiled_gan(
        tiny_config()
            .with_scorer_lr(0.001)
            .with_adversarial_lr(0.0005),
    );
    assert_eq!(gan.scorer().unwrap().learning_rate(), Some(0.001));
    assert_eq!(gan.adversarial().unwrap().learning_rate(), Some(0.0005));
}

#[test]
fn invalid_construction_parameters_are_rejected() {
    let err = Gan::<TestAutodiffBackend>::new(tiny_config().with_kernel_size(4), Default::default())
        .err()
        .unwrap();
    assert!(matches!(err, GanError::Precondition { field, .. } if field == "kernel_size"));
}
