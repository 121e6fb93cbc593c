use env_logger::{Builder, Env};
use gpblocks::datasets::{classification_toy, test_grid};
use gpblocks::optimization::{fit, Adam};
use gpblocks::{
    compose, dataset, initialise, transform, Bernoulli, Objective, Prior, Rbf, Result, ZeroMean,
};
use log::info;
use ndarray::{concatenate, s, Axis};

const N_TRAIN: usize = 100;
const N_TEST: usize = 500;
const N_ITERS: usize = 1000;
const STEP_SIZE: f64 = 0.01;

fn main() -> Result<()> {
    let env = Env::new().filter_or("GPBLOCKS_LOG", "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let (x, y) = classification_toy(N_TRAIN, 123);
    let train = dataset(&x, &y)?;

    let prior = Prior::new(ZeroMean(), Rbf::default());
    let posterior = compose(prior, Bernoulli::new(N_TRAIN));
    info!("Fit {posterior} on {N_TRAIN} points");

    let (params, constrainer, unconstrainer) = initialise(&posterior);
    let template = transform(&params, &unconstrainer)?;
    let init = template.to_flat();
    let objective = posterior.objective(&train, &constrainer, true)?;
    info!("Initial objective = {}", objective.value(&init)?);

    let res = fit(&objective, &init, Adam::new(STEP_SIZE), N_ITERS)?;
    let learned = transform(&template.with_flat(&res.params)?, &constrainer)?;
    info!("Learned {learned}");

    let xtest = test_grid(N_TEST);
    let predictive = posterior.predict(&train, &learned)?;
    let mean = predictive.mean(&xtest)?;
    let sigma = predictive.variance(&xtest)?.mapv(f64::sqrt);
    let proba = predictive.probability(&xtest)?;

    println!("Predictions every 25 test points (x, mean, sigma, proba)");
    println!(
        "{}",
        concatenate![
            Axis(1),
            xtest,
            mean.insert_axis(Axis(1)),
            sigma.insert_axis(Axis(1)),
            proba.insert_axis(Axis(1))
        ]
        .slice(s![..;25, ..])
    );
    Ok(())
}
