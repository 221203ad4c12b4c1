// Shapley
pub const SHAP_SAMPLES: usize = 2048;
pub const SHAP_ANCHOR_WEIGHT: f64 = 1e6;
pub const ADDITIVITY_TOLERANCE: f64 = 0.05;

// Regression
pub const RIDGE_PENALTY: f64 = 1e-6;
pub const PIVOT_EPS: f64 = 1e-12;
pub const KERNEL_WEIGHT_FLOOR: f64 = 1e-10;

// Lime
pub const LIME_SAMPLES: usize = 1000;
pub const KERNEL_WIDTH: f64 = 0.75;
pub const LIME_TOP_K: usize = 10;
pub const KEEP_PROBABILITY: f64 = 0.5;

// Saliency
pub const SALIENCY_STEPS: usize = 50;
pub const FINITE_DIFFERENCE_STEP: f64 = 1e-4;
pub const FOCUSED_TOP_TWO_SHARE: f64 = 0.5;
pub const DISTRIBUTED_MAX_CV: f64 = 0.5;
pub const HIERARCHICAL_DECAY: f64 = 0.8;
pub const HIERARCHICAL_DEPTH: usize = 5;
pub const SPARSITY_THRESHOLD: f64 = 0.1;
pub const CYCLE_MIN_AUTOCORRELATION: f64 = 0.3;

// Counterfactual
pub const TARGET_TOLERANCE: f64 = 0.05;
pub const DECISION_THRESHOLD: f64 = 0.5;
pub const MAX_FEATURE_CHANGES: usize = 3;
pub const SCENARIO_COUNT: usize = 3;
pub const POPULATION_SIZE: usize = 50;
pub const GENERATIONS: usize = 40;
pub const ELITE_COUNT: usize = 5;
pub const TOURNAMENT_SIZE: usize = 3;
pub const MUTATION_RATE: f64 = 0.2;
pub const CROSSOVER_RATE: f64 = 0.7;
pub const RESTARTS: usize = 5;
pub const GRADIENT_ITERATIONS: usize = 200;
pub const LEARNING_RATE: f64 = 0.1;
pub const MOMENTUM: f64 = 0.9;
pub const DISTANCE_WEIGHT: f64 = 0.01;
pub const RANDOM_ITERATIONS: usize = 1000;
pub const LARGE_CHANGE_RATIO: f64 = 0.5;
pub const LARGE_CHANGE_PENALTY: f64 = 0.8;
pub const IMMUTABLE_CHANGE_PENALTY: f64 = 0.1;
pub const CHANGE_EPS: f64 = 1e-9;
pub const TARGET_BONUS: f64 = 1.0;
pub const DISTANCE_PENALTY: f64 = 0.5;
pub const IMPORTANCE_BONUS: f64 = 0.1;
pub const IMPORTANCE_FLOOR: f64 = 0.1;
pub const MUTATION_SCALE: f64 = 0.25;
pub const REVERT_PROBABILITY: f64 = 0.2;
pub const RESTART_JITTER: f64 = 0.1;
pub const COUNTERFACTUAL_FD_STEP: f64 = 1e-3;
pub const RANDOM_BATCH: usize = 64;
pub const CANDIDATE_POOL_FACTOR: usize = 5;

// Shared
pub const FAILURE_RATIO: f64 = 0.5;
pub const CACHE_CAPACITY: usize = 256;
pub const FINGERPRINT_DECIMALS: i32 = 6;
