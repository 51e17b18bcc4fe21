use lentil::fit_train::*;
use lentil::generate::*;
use lentil::lentil_common::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Latent ENcoding models for Training Images with Likelihood-based\n\
		  and adversarial objectives (VAE, conditional/concrete VAE,\n\
		  sparse AE, AAE and their convolutional variants) on MNIST."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train a generative model",
        long_about = "Train a generative model in three stages:\n\
		      (1) Load MNIST and check the minibatch partition\n\
		      (2) Estimate the encoder-decoder (and discriminator) by Adam\n\
		      (3) Save the model, an image grid and test-set features.\n"
    )]
    Train(TrainArgs),

    #[command(
        about = "Decode a latent grid with a saved model",
        long_about = "Rebuild the architecture, restore a checkpoint\n\
		      and write a grid of generated images.\n"
    )]
    Generate(GenerateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            fit_train(args)?;
        }
        Commands::Generate(args) => {
            generate_images(args)?;
        }
    }

    info!("Done");
    Ok(())
}
