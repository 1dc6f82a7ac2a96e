use rs_chain_core::config::{ChannelOverrides, Config, RandomSpeakingOverrides};
use rs_chain_core::{ChainBot, InboundMessage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Store the channel tables in a scratch directory
    let mut config = Config::default();
    config.data_dir = std::env::temp_dir().join("rs-chain-exemple");

    // "#chatty" speaks on every eligible message and never bananas;
    // everything else it takes from the defaults (silent, 10% bananas)
    config.set_channel(
        "#chatty",
        ChannelOverrides {
            random_speaking: RandomSpeakingOverrides {
                probability: Some(1.0),
                banana_chance: Some(0.0),
                ..RandomSpeakingOverrides::default()
            },
            ..ChannelOverrides::default()
        },
    );

    let bot = ChainBot::new(config)?;

    // Every message is learned into its own channel
    let lines = [
        "the cat sat on the mat",
        "the dog sat on the log",
        "a cat and a dog walk into the bar",
        "hello everyone",
        "one two three", // three words: never learned
    ];
    for line in lines {
        bot.on_message(&InboundMessage::new("#demo", line))?;
    }

    // Messages addressed to the bot are learned unless ignore_bot_commands is set
    bot.on_message(&InboundMessage::new("#demo", "bot: tell me about the cat").addressed(true))?;

    // Generate a few phrases with and without a seed
    for i in 0..5 {
        println!("Generated phrase {}: {}", i + 1, bot.generate("#demo", None)?);
    }
    println!("Seeded with 'the': {}", bot.generate("#demo", Some("the"))?);
    println!("Seeded with 'the dog': {}", bot.generate("#demo", Some("the dog"))?);

    // Unknown channels have no data: the phrase is empty
    println!("Unknown channel: {:?}", bot.generate("#nowhere", None)?);

    // A fresh channel waits one throttle period (300s by default) before
    // speaking on its own, so nothing is said here
    let reply = bot.on_message(&InboundMessage::new("#chatty", "is anybody out there"))?;
    println!("Spontaneous reply in #chatty: {:?}", reply);

    // Seeds are limited to two words
    match bot.generate("#demo", Some("too many seed words")) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("Rejected seed: {e}"),
    }

    // Outgoing messages go through the banana filter of their channel
    println!("Filtered: {}", bot.out_filter("#demo", "pass me the salt please"));

    bot.close()?;
    Ok(())
}
