use anyhow::Result;

pub mod cliclack;

pub trait Prompt {
    /// Render an answer as markdown
    fn render(&mut self, text: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self, label: &str, sublabel: Option<&str>);
    /// Stop the spinner, if one is running
    fn hide_busy(&mut self);
    fn close(&self);
    fn blockelf_ready(&self) {
        println!("\n");
        println!("BlockElf is ready! Ask about balances, prices, blocks or transactions.");
        println!("\n");
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for InputType::Message
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
