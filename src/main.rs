fn main() {
    if let Err(err) = robot_fight_night_lib::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
