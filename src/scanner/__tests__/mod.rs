mod automaton_test;
